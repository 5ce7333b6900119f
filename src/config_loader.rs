use crate::config::AnalysisConfig;
use color_eyre::eyre::{Context, Result};
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<AnalysisConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file {}", config_path.display()))?;

    // An empty file parses as null; treat it as "all defaults"
    let value: serde_yaml::Value = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
    let config: AnalysisConfig = if value.is_null() {
        AnalysisConfig::default()
    } else {
        serde_yaml::from_value(value)
            .with_context(|| format!("Invalid config file {}", config_path.display()))?
    };

    config.validate()?;
    Ok(config)
}

/// Load the given config file, or fall back to defaults
pub fn load_or_default(config_path: Option<&Path>) -> Result<AnalysisConfig> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(AnalysisConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RankingStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "router:\n  look_ahead: 2\nmessages:\n  type_pattern: \"Ping|Pong\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ranking_strategy().unwrap(), RankingStrategy::GreedyTwoHop);
        assert_eq!(config.messages.type_pattern, "Ping|Pong");
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(load_config(file.path()).unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "router:\n  look_ahead: 7").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_path_uses_defaults() {
        assert_eq!(load_or_default(None).unwrap(), AnalysisConfig::default());
    }
}
