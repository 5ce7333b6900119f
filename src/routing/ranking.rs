//! Forwarding-preference ranking of a node's neighbors.
//!
//! A ranking answers "if this node held a message for `target`, in which
//! order would it prefer its neighbors as the next hop?". Neighbors that
//! the router cannot tell apart share a group and therefore a rank.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::topology::{NodeId, Topology};
use crate::utils::math::distance;

/// Neighbors sharing one preference position. Ranks start at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub rank: u32,
    pub members: Vec<NodeId>,
}

/// Routing model used to predict forwarding choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankingStrategy {
    /// Prefer the neighbor closest to the target
    Greedy,
    /// Prefer the neighbor with the closest node within one further hop
    GreedyTwoHop,
}

impl RankingStrategy {
    /// Strategy for a greedy router with the given look-ahead depth
    pub fn greedy(look_ahead: u8) -> Option<Self> {
        match look_ahead {
            1 => Some(RankingStrategy::Greedy),
            2 => Some(RankingStrategy::GreedyTwoHop),
            _ => None,
        }
    }

    /// Rank the neighbors of `node`, consulting and filling `cache`.
    ///
    /// A cache belongs to a single target address; results for other targets
    /// must not share it.
    pub fn rank<'c>(
        &self,
        node: NodeId,
        target: f64,
        topology: &Topology,
        cache: &'c mut RankCache,
    ) -> Result<&'c [RankedGroup], AnalysisError> {
        match cache.groups.entry(node) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_slice()),
            Entry::Vacant(entry) => {
                let groups = self.compute(node, target, topology)?;
                Ok(entry.insert(groups).as_slice())
            }
        }
    }

    /// 1-based rank `from` gives to its neighbor `to`; the first group
    /// containing `to` wins.
    pub fn rank_of(
        &self,
        to: NodeId,
        from: NodeId,
        target: f64,
        topology: &Topology,
        cache: &mut RankCache,
    ) -> Result<u32, AnalysisError> {
        self.rank(from, target, topology, cache)?
            .iter()
            .find(|group| group.members.contains(&to))
            .map(|group| group.rank)
            .ok_or(AnalysisError::RoutingUnreachable { from, to })
    }

    fn compute(
        &self,
        node: NodeId,
        target: f64,
        topology: &Topology,
    ) -> Result<Vec<RankedGroup>, AnalysisError> {
        let mut keyed = Vec::with_capacity(topology.degree(node));
        for &neighbor in topology.neighbors(node) {
            let key = match self {
                RankingStrategy::Greedy => distance(topology.location(neighbor)?, target),
                RankingStrategy::GreedyTwoHop => lookahead_key(neighbor, target, topology)?,
            };
            keyed.push((key, neighbor));
        }
        // Stable sort keeps tied neighbors in edge order
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut groups: Vec<RankedGroup> = Vec::new();
        let mut last_key = None;
        for (key, neighbor) in keyed {
            let tied = last_key == Some(key);
            last_key = Some(key);
            if tied {
                if let Some(group) = groups.last_mut() {
                    group.members.push(neighbor);
                    continue;
                }
            }
            let rank = groups.len() as u32 + 1;
            groups.push(RankedGroup {
                rank,
                members: vec![neighbor],
            });
        }
        Ok(groups)
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingStrategy::Greedy => write!(f, "greedy"),
            RankingStrategy::GreedyTwoHop => write!(f, "greedy (2-hop look-ahead)"),
        }
    }
}

fn lookahead_key(neighbor: NodeId, target: f64, topology: &Topology) -> Result<f64, AnalysisError> {
    let mut best = distance(topology.location(neighbor)?, target);
    for &next in topology.neighbors(neighbor) {
        best = best.min(distance(topology.location(next)?, target));
    }
    Ok(best)
}

/// Memoized rankings for one tree build
#[derive(Debug, Default)]
pub struct RankCache {
    groups: HashMap<NodeId, Vec<RankedGroup>>,
}

impl RankCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A(0.8) with neighbors B(0.6) and C(0.7); C also reaches D(0.51).
    /// Target 0.5: B is closer itself, C is closer one hop on.
    fn lookahead_graph() -> Topology {
        let mut topology = Topology::new(0);
        topology.add_node(0, 0.8, false);
        topology.add_node(1, 0.6, false);
        topology.add_node(2, 0.7, false);
        topology.add_node(3, 0.51, false);
        topology.add_edge(0, 1).unwrap();
        topology.add_edge(0, 2).unwrap();
        topology.add_edge(2, 3).unwrap();
        topology
    }

    fn members(groups: &[RankedGroup]) -> Vec<Vec<NodeId>> {
        groups.iter().map(|g| g.members.clone()).collect()
    }

    #[test]
    fn test_greedy_orders_by_distance() {
        let topology = lookahead_graph();
        let mut cache = RankCache::new();
        let groups = RankingStrategy::Greedy.rank(0, 0.5, &topology, &mut cache).unwrap();
        assert_eq!(members(groups), vec![vec![1], vec![2]]);
        assert_eq!(groups[1].rank, 2);
    }

    #[test]
    fn test_two_hop_lookahead_reorders() {
        let topology = lookahead_graph();
        let mut cache = RankCache::new();
        let groups = RankingStrategy::GreedyTwoHop
            .rank(0, 0.5, &topology, &mut cache)
            .unwrap();
        assert_eq!(members(groups), vec![vec![2], vec![1]]);
    }

    #[test]
    fn test_ties_share_a_rank() {
        let mut topology = Topology::new(0);
        topology.add_node(0, 0.5, false);
        topology.add_node(1, 0.25, false);
        topology.add_node(2, 0.9, false);
        topology.add_node(3, 0.75, false);
        topology.add_edge(0, 1).unwrap();
        topology.add_edge(0, 2).unwrap();
        topology.add_edge(0, 3).unwrap();

        let mut cache = RankCache::new();
        let strategy = RankingStrategy::Greedy;
        let groups = strategy.rank(0, 0.5, &topology, &mut cache).unwrap().to_vec();
        assert_eq!(
            groups,
            vec![
                RankedGroup { rank: 1, members: vec![1, 3] },
                RankedGroup { rank: 2, members: vec![2] },
            ]
        );
        assert_eq!(strategy.rank_of(3, 0, 0.5, &topology, &mut cache), Ok(1));
        assert_eq!(strategy.rank_of(2, 0, 0.5, &topology, &mut cache), Ok(2));
    }

    #[test]
    fn test_rank_of_non_neighbor_fails() {
        let topology = lookahead_graph();
        let mut cache = RankCache::new();
        assert_eq!(
            RankingStrategy::Greedy.rank_of(3, 0, 0.5, &topology, &mut cache),
            Err(AnalysisError::RoutingUnreachable { from: 0, to: 3 })
        );
    }

    #[test]
    fn test_cache_is_filled_once_per_node() {
        let topology = lookahead_graph();
        let mut cache = RankCache::new();
        let strategy = RankingStrategy::Greedy;
        strategy.rank(0, 0.5, &topology, &mut cache).unwrap();
        strategy.rank_of(1, 0, 0.5, &topology, &mut cache).unwrap();
        strategy.rank_of(0, 2, 0.5, &topology, &mut cache).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_greedy_constructor() {
        assert_eq!(RankingStrategy::greedy(1), Some(RankingStrategy::Greedy));
        assert_eq!(RankingStrategy::greedy(2), Some(RankingStrategy::GreedyTwoHop));
        assert_eq!(RankingStrategy::greedy(3), None);
    }
}
