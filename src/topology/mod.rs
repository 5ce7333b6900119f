//! Network topology module.
//!
//! Immutable graph snapshots built from GML files, and the per-cycle
//! collection the analysis looks messages up in.

pub mod graph;
pub mod snapshots;
pub mod types;

// Re-export key types for easier access
pub use graph::Topology;
pub use snapshots::TopologySet;
pub use types::{GraphStats, NodeId, NodeInfo};
