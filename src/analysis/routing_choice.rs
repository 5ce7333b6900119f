//! Loader for observed routing-choice frequencies.
//!
//! Two layouts are accepted:
//!
//! * a JSON object mapping rank to percent, e.g. `{"1": 61.2, "2": 24.0}`
//! * JSON lines written by the simulator, one per cycle:
//!   `{"cycle": 4, "churn_count": 0, "routing_choice_frequency": [{"choice": 1, "frequency": 120}]}`
//!
//! For the second layout, frequencies of the latest cycle (cycle 0 is always
//! empty and ignored) are summed per choice and turned into percentages.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use color_eyre::eyre::{eyre, Context, Result};
use serde::Deserialize;

use crate::routing::ChoiceTable;

#[derive(Debug, Deserialize)]
struct CycleFrequencies {
    cycle: u64,
    #[serde(default)]
    routing_choice_frequency: Vec<ChoiceFrequency>,
}

#[derive(Debug, Deserialize)]
struct ChoiceFrequency {
    choice: u32,
    frequency: f64,
}

/// Load a routing-choice table from either supported layout
pub fn load_choice_table(path: &Path) -> Result<ChoiceTable> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read routing choice file {}", path.display()))?;
    let table = parse_choice_table(&content)
        .with_context(|| format!("Failed to parse routing choice file {}", path.display()))?;
    log::info!(
        "Loaded routing choices for {} ranks from {}",
        table.iter().count(),
        path.display()
    );
    Ok(table)
}

pub fn parse_choice_table(content: &str) -> Result<ChoiceTable> {
    if let Ok(percent) = serde_json::from_str::<BTreeMap<u32, f64>>(content) {
        return Ok(ChoiceTable::new(percent));
    }

    let mut by_cycle: BTreeMap<u64, BTreeMap<u32, f64>> = BTreeMap::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: CycleFrequencies = match serde_json::from_str(line) {
            Ok(row) => row,
            Err(e) => {
                log::warn!("Skipping routing choice line {}: {}", index + 1, e);
                continue;
            }
        };
        if row.cycle == 0 {
            continue;
        }
        let counts = by_cycle.entry(row.cycle).or_default();
        for entry in row.routing_choice_frequency {
            *counts.entry(entry.choice).or_insert(0.0) += entry.frequency;
        }
    }

    let (cycle, counts) = by_cycle
        .into_iter()
        .next_back()
        .ok_or_else(|| eyre!("No routing choice frequencies found"))?;
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return Err(eyre!("Routing choice frequencies for cycle {} are all zero", cycle));
    }
    log::debug!("Using routing choices from cycle {}", cycle);

    Ok(ChoiceTable::new(
        counts
            .into_iter()
            .map(|(choice, frequency)| (choice, frequency / total * 100.0))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_object() {
        let table = parse_choice_table(r#"{"1": 60.0, "2": 30.0, "3": 10.0}"#).unwrap();
        assert_eq!(table.get(2), Some(30.0));
        assert!((table.probability(1) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_frequency_lines_use_latest_cycle() {
        let content = r#"
{"cycle": 0, "churn_count": 0, "routing_choice_frequency": []}
{"cycle": 1, "churn_count": 0, "routing_choice_frequency": [{"choice": 1, "frequency": 10}]}
{"cycle": 2, "churn_count": 0, "routing_choice_frequency": [{"choice": 1, "frequency": 30}, {"choice": 2, "frequency": 10}]}
{"cycle": 2, "churn_count": 1, "routing_choice_frequency": [{"choice": 1, "frequency": 30}, {"choice": 3, "frequency": 30}]}
"#;
        let table = parse_choice_table(content).unwrap();
        let percent: Vec<(u32, f64)> = table.iter().collect();
        assert_eq!(percent.len(), 3);
        for ((rank, pct), expected) in percent.into_iter().zip([(1, 60.0), (2, 10.0), (3, 30.0)]) {
            assert_eq!(rank, expected.0);
            assert!((pct - expected.1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(parse_choice_table("").is_err());
        assert!(parse_choice_table(r#"{"cycle": 0, "routing_choice_frequency": []}"#).is_err());
    }
}
