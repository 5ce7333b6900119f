//! Core data types for sender-set analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::routing::{AbstainReason, Distribution, RankClasses};
use crate::topology::NodeId;

/// One hop of a recorded routing path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathHop {
    pub id: NodeId,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_adversary: bool,
    /// Hops travelled from the source when this node received the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingPath {
    #[serde(default)]
    pub path: Vec<PathHop>,
    #[serde(default)]
    pub length: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPath {
    #[serde(default)]
    pub length: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message as recorded by the simulator, one JSON object per line.
///
/// Fields the analysis does not know are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub cycle: u64,
    /// Ground truth, used only for scoring
    pub source_node: NodeId,
    pub destination_node: NodeId,
    /// Address the message was routed towards
    pub target: f64,
    pub routing_path: RoutingPath,
    #[serde(default)]
    pub connection_path: ConnectionPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
    /// Circular distance between source and destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymity_set: Option<AnonymitySet>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The sender set as a flat list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSet {
    pub length: usize,
    pub nodes: Vec<NodeId>,
}

/// Result of analyzing an intercepted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymitySet {
    pub calculated: bool,
    /// Intercept hop of the first adversary on the path
    pub hop: usize,
    pub estimated_work: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<AbstainReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_set: Option<FullSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranked_set: Option<RankClasses>,
    /// Exponential-backoff distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_set: Option<Distribution>,
    /// Distribution fitted to observed routing choices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_set_actual: Option<Distribution>,
    /// Uniform over the best rank class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_set_top_rank: Option<Distribution>,
}

impl AnonymitySet {
    pub fn not_calculated(hop: usize, estimated_work: u64, reason: AbstainReason) -> Self {
        Self {
            calculated: false,
            hop,
            estimated_work,
            skipped: Some(reason),
            tree: None,
            full_set: None,
            ranked_set: None,
            probability_set: None,
            probability_set_actual: None,
            probability_set_top_rank: None,
        }
    }
}

/// A named run-level metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub short: String,
    pub long: String,
    pub value: f64,
}

/// Related metrics reported together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFamily {
    pub name: String,
    pub metrics: Vec<MetricValue>,
}

impl MetricFamily {
    pub fn get(&self, short: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.short == short).map(|m| m.value)
    }
}

/// Accuracy broken down by intercept hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopSummary {
    pub hop: usize,
    pub intercepted: u64,
    pub calculated: u64,
    pub top_rank_hit_percent: f64,
    pub best_entropy_hit_percent: f64,
    pub normalized_entropy_avg: f64,
}

/// Metadata about an analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub analysis_timestamp: String,
    pub routes_file: String,
    pub topology_path: String,
    pub router: String,
    pub snapshots: usize,
    pub records_read: usize,
    pub records_malformed: usize,
    pub records_filtered: usize,
}

/// Complete analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymityReport {
    pub metadata: ReportMetadata,
    pub families: Vec<MetricFamily>,
    /// Intercept hop -> number of intercepted messages
    pub intercept_hops: BTreeMap<usize, u64>,
    pub by_hop: Vec<HopSummary>,
}

impl AnonymityReport {
    /// Look up a metric by short name across all families
    pub fn metric(&self, short: &str) -> Option<f64> {
        self.families.iter().find_map(|family| family.get(short))
    }
}

/// Accept `true`/`false` as well as `0`/`1`
fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}
