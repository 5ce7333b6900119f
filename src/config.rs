//! Analysis configuration.
//!
//! Every section is optional; an empty file (or no file at all) yields the
//! defaults below.
//!
//! ```yaml
//! router:
//!   type: greedy          # or DHTRouterGreedy
//!   look_ahead: 1
//! sender_set:
//!   max_depth: 0
//!   work_multiplier: 2.0
//! messages:
//!   type_pattern: "Ping"
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::routing::{BuildLimits, RankingStrategy};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub router: RouterConfig,
    pub sender_set: SenderSetConfig,
    pub messages: MessageConfig,
}

/// Routing model used to rank forwarding choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    #[serde(rename = "type")]
    pub router_type: RouterType,
    pub look_ahead: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterType {
    #[serde(rename = "greedy", alias = "DHTRouterGreedy")]
    Greedy,
}

/// Limits on sender-set calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSetConfig {
    /// Largest intercept hop to analyze, 0 for no limit
    pub max_depth: usize,
    /// `null` disables the estimated-work ceiling
    pub work_multiplier: Option<f64>,
}

/// Which recorded messages are analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Regex matched against `message_type`
    pub type_pattern: String,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid router configuration: {0}")]
    InvalidRouter(String),
    #[error("Invalid sender set configuration: {0}")]
    InvalidSenderSet(String),
    #[error("Invalid message filter: {0}")]
    InvalidMessages(String),
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ranking_strategy()?;

        if let Some(multiplier) = self.sender_set.work_multiplier {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(ValidationError::InvalidSenderSet(format!(
                    "work_multiplier must be a positive number, got {}",
                    multiplier
                )));
            }
        }

        self.message_filter()?;
        Ok(())
    }

    /// Ranking strategy for the configured router
    pub fn ranking_strategy(&self) -> Result<RankingStrategy, ValidationError> {
        match self.router.router_type {
            RouterType::Greedy => RankingStrategy::greedy(self.router.look_ahead).ok_or_else(|| {
                ValidationError::InvalidRouter(format!(
                    "look_ahead must be 1 or 2, got {}",
                    self.router.look_ahead
                ))
            }),
        }
    }

    pub fn build_limits(&self) -> BuildLimits {
        BuildLimits {
            max_depth: self.sender_set.max_depth,
            work_multiplier: self.sender_set.work_multiplier,
        }
    }

    /// Compiled, anchored message type filter
    pub fn message_filter(&self) -> Result<Regex, ValidationError> {
        if self.messages.type_pattern.is_empty() {
            return Err(ValidationError::InvalidMessages(
                "type_pattern cannot be empty".to_string(),
            ));
        }
        Regex::new(&format!("^(?:{})$", self.messages.type_pattern))
            .map_err(|e| ValidationError::InvalidMessages(e.to_string()))
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router_type: RouterType::Greedy,
            look_ahead: 1,
        }
    }
}

impl Default for SenderSetConfig {
    fn default() -> Self {
        let limits = BuildLimits::default();
        Self {
            max_depth: limits.max_depth,
            work_multiplier: limits.work_multiplier,
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            type_pattern: "Ping".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AnalysisConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.ranking_strategy().unwrap(), RankingStrategy::Greedy);
        assert_eq!(config.build_limits(), BuildLimits::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_router_name_and_lookahead() {
        let yaml = r#"
router:
  type: DHTRouterGreedy
  look_ahead: 2
sender_set:
  work_multiplier: null
"#;
        let config: AnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ranking_strategy().unwrap(), RankingStrategy::GreedyTwoHop);
        assert_eq!(config.build_limits(), BuildLimits::unlimited());
    }

    #[test]
    fn test_invalid_lookahead_is_rejected() {
        let config: AnalysisConfig = serde_yaml::from_str("router: { look_ahead: 3 }").unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidRouter(_))));
    }

    #[test]
    fn test_unknown_router_type_fails_to_parse() {
        assert!(serde_yaml::from_str::<AnalysisConfig>("router: { type: random }").is_err());
    }

    #[test]
    fn test_nonpositive_multiplier_is_rejected() {
        let config: AnalysisConfig =
            serde_yaml::from_str("sender_set: { work_multiplier: 0 }").unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSenderSet(_))));
    }

    #[test]
    fn test_message_filter_is_anchored() {
        let config = AnalysisConfig::default();
        let filter = config.message_filter().unwrap();
        assert!(filter.is_match("Ping"));
        assert!(!filter.is_match("PingReply"));

        let mut bad = AnalysisConfig::default();
        bad.messages.type_pattern = "(".to_string();
        assert!(matches!(bad.validate(), Err(ValidationError::InvalidMessages(_))));
    }
}
