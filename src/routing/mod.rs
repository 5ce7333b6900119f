//! Backward reconstruction of likely routing paths.
//!
//! Given the adversary that intercepted a message and the neighbor it came
//! from, this module predicts which nodes could have originated it and how
//! likely each one is.

pub mod distribution;
pub mod rank_classes;
pub mod ranking;
pub mod tree;

pub use distribution::{distribution, top_rank_distribution, ChoiceTable, Distribution, EdgeModel};
pub use rank_classes::RankClasses;
pub use ranking::{RankCache, RankedGroup, RankingStrategy};
pub use tree::{AbstainReason, BuildLimits, BuildOutcome, CandidateTree, TreeBuilder};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::topology::{NodeId, Topology};

    const LOCATIONS: [f64; 14] = [
        0.80, 0.62, 0.35, 0.75, 0.45, 0.60, 0.50, 0.52, 0.15, 0.29, 0.39, 0.90, 0.05, 0.70,
    ];

    const EDGES: [(NodeId, NodeId); 18] = [
        (6, 7),
        (7, 4),
        (4, 5),
        (4, 10),
        (4, 1),
        (5, 13),
        (10, 9),
        (13, 0),
        (6, 2),
        (2, 1),
        (6, 3),
        (3, 9),
        (6, 8),
        (8, 5),
        (6, 11),
        (11, 9),
        (6, 12),
        (12, 7),
    ];

    /// Fourteen nodes with a single adversary (6) sitting on the target 0.5
    pub fn size_14() -> Topology {
        let mut topology = Topology::new(0);
        for (id, location) in LOCATIONS.iter().enumerate() {
            topology.add_node(id as NodeId, *location, id == 6);
        }
        for (a, b) in EDGES {
            topology.add_edge(a, b).unwrap();
        }
        topology
    }

    /// Two connected nodes, adversary 0
    pub fn pair() -> Topology {
        let mut topology = Topology::new(0);
        topology.add_node(0, 0.5, true);
        topology.add_node(1, 0.1, false);
        topology.add_edge(0, 1).unwrap();
        topology
    }

    /// Adversary 0 behind predecessor 1, which reaches 4 through both 2
    /// and 3. Node 4 ranks 2 and 3 equally for target 0.5.
    pub fn diamond() -> Topology {
        let mut topology = Topology::new(0);
        for (id, location) in [(0, 0.875), (1, 0.5), (2, 0.25), (3, 0.75), (4, 0.0)] {
            topology.add_node(id, location, id == 0);
        }
        for (a, b) in [(0, 1), (1, 2), (1, 3), (2, 4), (3, 4)] {
            topology.add_edge(a, b).unwrap();
        }
        topology
    }

    pub fn build_unlimited(
        topology: &Topology,
        adversary: NodeId,
        predecessor: NodeId,
        hop: usize,
        strategy: RankingStrategy,
    ) -> CandidateTree {
        let outcome = TreeBuilder::new(topology, strategy)
            .with_limits(BuildLimits::unlimited())
            .build(adversary, predecessor, hop, 0.5)
            .unwrap();
        match outcome {
            BuildOutcome::Built(tree) => tree,
            BuildOutcome::Abstained { .. } => panic!("tree was not built"),
        }
    }
}
