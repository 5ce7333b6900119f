//! Topology type definitions.

use serde::{Deserialize, Serialize};

/// Node identifier as written by the simulator
pub type NodeId = u32;

/// Per-node attributes carried by a topology snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    /// Position on the circular key space `[0, 1)`
    pub location: f64,
    pub adversary: bool,
}

/// Summary statistics for a single snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub cycle: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub adversary_count: usize,
    pub degree_avg: f64,
    pub degree_std: f64,
    /// Largest shortest-path length within any connected component
    pub diameter: usize,
    pub connected_components: usize,
}
