//! Errors raised while analyzing a single intercepted message.
//!
//! These are precondition violations in the recorded input data. The batch
//! driver reports them per message and keeps going.

use crate::topology::NodeId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Node {from} has no ranked route to its neighbor {to}")]
    RoutingUnreachable { from: NodeId, to: NodeId },

    #[error("Adversary cannot be the source node: {node}")]
    AdversaryIsSource { node: NodeId },

    #[error("Node {0} is not part of the topology")]
    UnknownNode(NodeId),

    #[error("Adversary {node} intercepted at hop {hop}; interceptions start at hop 1")]
    InvalidHop { node: NodeId, hop: usize },

    #[error("No topology snapshot available for cycle {cycle}")]
    MissingTopology { cycle: u64 },
}
