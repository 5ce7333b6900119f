//! Candidate-sender tree.
//!
//! The tree is rooted at the adversary that intercepted a message. Its only
//! depth-1 entry is the predecessor the adversary received the message from,
//! which is known for certain. Deeper entries are reconstructed backwards:
//! a neighbor `c` of entry `p` becomes a child of `p` when `c` would have
//! forwarded the message to `p` with a preference rank the builder currently
//! accepts. The edge rank stored on the child is that preference.
//!
//! The flat sender set is computed separately with a plain BFS over the
//! same hop budget, so it always covers every node the ranked expansion can
//! reach.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ranking::{RankCache, RankingStrategy};
use crate::error::AnalysisError;
use crate::topology::{NodeId, Topology};

/// Arena index of the root (adversary) entry
pub const ROOT: usize = 0;
/// Arena index of the predecessor entry
pub const PREDECESSOR: usize = 1;

/// Cost limits applied before a tree is built
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildLimits {
    /// Largest hop count to analyze, 0 for no limit
    pub max_depth: usize,
    /// Abstain when `estimated_work > work_multiplier * node_count`
    pub work_multiplier: Option<f64>,
}

impl Default for BuildLimits {
    fn default() -> Self {
        Self {
            max_depth: 0,
            work_multiplier: Some(2.0),
        }
    }
}

impl BuildLimits {
    /// No depth cap and no work ceiling
    pub fn unlimited() -> Self {
        Self {
            max_depth: 0,
            work_multiplier: None,
        }
    }
}

/// Why a build was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    DepthLimit,
    WorkLimit,
}

/// Result of a build request
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Built(CandidateTree),
    Abstained {
        estimated_work: u64,
        reason: AbstainReason,
    },
}

impl BuildOutcome {
    pub fn tree(&self) -> Option<&CandidateTree> {
        match self {
            BuildOutcome::Built(tree) => Some(tree),
            BuildOutcome::Abstained { .. } => None,
        }
    }

    pub fn estimated_work(&self) -> u64 {
        match self {
            BuildOutcome::Built(tree) => tree.estimated_work(),
            BuildOutcome::Abstained { estimated_work, .. } => *estimated_work,
        }
    }
}

/// One position in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    pub node: NodeId,
    pub depth: usize,
    /// Preference rank of the edge to the parent; 1 for root and predecessor
    pub rank: u32,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Candidate routing paths back from an adversary, plus the sender set
#[derive(Debug, Clone)]
pub struct CandidateTree {
    entries: Vec<TreeEntry>,
    sender_set: Vec<NodeId>,
    hop: usize,
    height: usize,
    estimated_work: u64,
}

impl CandidateTree {
    fn new(adversary: NodeId, hop: usize, sender_set: Vec<NodeId>, estimated_work: u64) -> Self {
        Self {
            entries: vec![TreeEntry {
                node: adversary,
                depth: 0,
                rank: 1,
                parent: None,
                children: Vec::new(),
            }],
            sender_set,
            hop,
            height: 1,
            estimated_work,
        }
    }

    fn push_child(&mut self, parent: usize, node: NodeId, rank: u32) -> usize {
        let depth = self.entries[parent].depth + 1;
        let index = self.entries.len();
        self.entries.push(TreeEntry {
            node,
            depth,
            rank,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.entries[parent].children.push(index);
        self.height = self.height.max(depth + 1);
        index
    }

    fn has_child(&self, parent: usize, node: NodeId) -> bool {
        self.entries[parent]
            .children
            .iter()
            .any(|&child| self.entries[child].node == node)
    }

    pub fn adversary(&self) -> NodeId {
        self.entries[ROOT].node
    }

    /// The predecessor, if the tree has one
    pub fn predecessor(&self) -> Option<NodeId> {
        self.entries.get(PREDECESSOR).map(|e| e.node)
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn estimated_work(&self) -> u64 {
        self.estimated_work
    }

    /// Number of levels, counting the root level
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&TreeEntry> {
        self.entries.get(index)
    }

    /// Node ids at `depth` in insertion order, `None` past the last level
    pub fn level(&self, depth: usize) -> Option<Vec<NodeId>> {
        if depth >= self.height {
            return None;
        }
        Some(
            self.entries
                .iter()
                .filter(|e| e.depth == depth)
                .map(|e| e.node)
                .collect(),
        )
    }

    /// Every node reachable by a plain BFS from the predecessor within the
    /// hop budget, in discovery order. Never contains the adversary.
    pub fn sender_set(&self) -> &[NodeId] {
        &self.sender_set
    }

    /// Node ids from `index` up to the root, starting with `index` itself
    pub fn path_to_root(&self, index: usize) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.entries.get(index), move |e| {
            e.parent.and_then(|p| self.entries.get(p))
        })
        .map(|e| e.node)
    }

    /// Bracket form `(node--rank(child...)...)`, e.g. `(6--1(7--1(4--1)))`
    pub fn to_bracket(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(ROOT, 0usize)];
        push_open(&mut out, &self.entries[ROOT]);
        while let Some(&(index, next)) = stack.last() {
            match self.entries[index].children.get(next) {
                Some(&child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    push_open(&mut out, &self.entries[child]);
                    stack.push((child, 0));
                }
                None => {
                    out.push(')');
                    stack.pop();
                }
            }
        }
        out
    }
}

fn push_open(out: &mut String, entry: &TreeEntry) {
    out.push('(');
    out.push_str(&entry.node.to_string());
    out.push_str("--");
    out.push_str(&entry.rank.to_string());
}

/// Builds candidate trees over one topology snapshot
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'a> {
    topology: &'a Topology,
    strategy: RankingStrategy,
    limits: BuildLimits,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(topology: &'a Topology, strategy: RankingStrategy) -> Self {
        Self {
            topology,
            strategy,
            limits: BuildLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: BuildLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Rough number of paths a full expansion explores:
    /// `ceil(average_degree) ^ hop`, saturating
    pub fn estimated_work(&self, hop: usize) -> u64 {
        let degree = self.topology.average_degree().ceil() as u64;
        degree.saturating_pow(u32::try_from(hop).unwrap_or(u32::MAX))
    }

    /// Build the tree for a message the `adversary` received from
    /// `predecessor`, `hop` hops after it left its source. `hop` must be
    /// at least 1, since the predecessor itself is one hop away.
    pub fn build(
        &self,
        adversary: NodeId,
        predecessor: NodeId,
        hop: usize,
        target: f64,
    ) -> Result<BuildOutcome, AnalysisError> {
        for node in [adversary, predecessor] {
            if !self.topology.contains(node) {
                return Err(AnalysisError::UnknownNode(node));
            }
        }
        if hop == 0 {
            return Err(AnalysisError::InvalidHop {
                node: adversary,
                hop,
            });
        }

        let estimated_work = self.estimated_work(hop);
        if self.limits.max_depth > 0 && hop > self.limits.max_depth {
            log::debug!(
                "Skipping tree for adversary {}: hop {} exceeds depth limit {}",
                adversary,
                hop,
                self.limits.max_depth
            );
            return Ok(BuildOutcome::Abstained {
                estimated_work,
                reason: AbstainReason::DepthLimit,
            });
        }
        if let Some(multiplier) = self.limits.work_multiplier {
            let ceiling = multiplier * self.topology.node_count() as f64;
            if estimated_work as f64 > ceiling {
                log::debug!(
                    "Skipping tree for adversary {}: estimated work {} exceeds {:.0}",
                    adversary,
                    estimated_work,
                    ceiling
                );
                return Ok(BuildOutcome::Abstained {
                    estimated_work,
                    reason: AbstainReason::WorkLimit,
                });
            }
        }

        let sender_set = self.sender_set(adversary, predecessor, hop);
        let mut tree = CandidateTree::new(adversary, hop, sender_set, estimated_work);
        let start = tree.push_child(ROOT, predecessor, 1);
        let mut cache = RankCache::new();
        self.expand(&mut tree, start, target, &mut cache)?;

        log::debug!(
            "Built tree for adversary {} / predecessor {}: height {}, {} entries, sender set {}",
            adversary,
            predecessor,
            tree.height(),
            tree.entries.len(),
            tree.sender_set.len()
        );
        Ok(BuildOutcome::Built(tree))
    }

    /// Level-by-level BFS from the predecessor, `hop` levels deep. The
    /// adversary is marked visited up front so no path runs through it.
    fn sender_set(&self, adversary: NodeId, predecessor: NodeId, hop: usize) -> Vec<NodeId> {
        let mut visited = HashSet::from([adversary]);
        let mut members = Vec::new();
        let mut frontier = vec![predecessor];
        for _ in 0..hop {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for node in frontier {
                if !visited.insert(node) {
                    continue;
                }
                members.push(node);
                next.extend_from_slice(self.topology.neighbors(node));
            }
            frontier = next;
        }
        members
    }

    /// Grow the tree with rank-1 choices, widening the accepted rank one
    /// step at a time whenever the tree falls short of the hop budget.
    fn expand(
        &self,
        tree: &mut CandidateTree,
        start: usize,
        target: f64,
        cache: &mut RankCache,
    ) -> Result<(), AnalysisError> {
        // No ranking has more groups than the largest neighbor list
        let rank_limit = self.topology.max_degree() as u32;
        let mut frontier = vec![start];
        let mut threshold: u32 = 1;
        loop {
            if !self.extend_top_ranked(tree, frontier, target, cache)?.is_empty() {
                threshold = 1;
            }
            if tree.height() > tree.hop {
                return Ok(());
            }

            threshold += 1;
            if threshold > rank_limit {
                log::trace!(
                    "Tree for adversary {} stops at height {}",
                    tree.adversary(),
                    tree.height()
                );
                return Ok(());
            }

            let known = tree.entries.len();
            let mut widened = Vec::new();
            for index in PREDECESSOR..known {
                widened.extend(self.extend_entry(tree, index, threshold, target, cache)?);
            }
            if !widened.is_empty() {
                threshold = 1;
            }
            frontier = widened;
        }
    }

    /// BFS over `frontier` and everything it adds, accepting only rank 1
    fn extend_top_ranked(
        &self,
        tree: &mut CandidateTree,
        frontier: Vec<usize>,
        target: f64,
        cache: &mut RankCache,
    ) -> Result<Vec<usize>, AnalysisError> {
        let mut added = Vec::new();
        let mut pending = frontier;
        while !pending.is_empty() {
            let mut next = Vec::new();
            for index in pending {
                if tree.entries[index].depth >= tree.hop {
                    continue;
                }
                next.extend(self.extend_entry(tree, index, 1, target, cache)?);
            }
            added.extend_from_slice(&next);
            pending = next;
        }
        Ok(added)
    }

    /// Add every neighbor of the entry's node that would forward to it with
    /// rank `<= max_rank`, skipping nodes already on the path or already
    /// children. Returns the new entries.
    fn extend_entry(
        &self,
        tree: &mut CandidateTree,
        index: usize,
        max_rank: u32,
        target: f64,
        cache: &mut RankCache,
    ) -> Result<Vec<usize>, AnalysisError> {
        let node = tree.entries[index].node;
        let path: Vec<NodeId> = tree.path_to_root(index).collect();
        let mut added = Vec::new();
        for &candidate in self.topology.neighbors(node) {
            if path.contains(&candidate) || tree.has_child(index, candidate) {
                continue;
            }
            let rank = self
                .strategy
                .rank_of(node, candidate, target, self.topology, cache)?;
            if rank <= max_rank {
                added.push(tree.push_child(index, candidate, rank));
            }
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::test_support::{diamond, pair, size_14};

    fn built(outcome: BuildOutcome) -> CandidateTree {
        match outcome {
            BuildOutcome::Built(tree) => tree,
            BuildOutcome::Abstained { .. } => panic!("tree was not built"),
        }
    }

    fn build(topology: &Topology, adversary: NodeId, predecessor: NodeId, hop: usize) -> CandidateTree {
        let builder = TreeBuilder::new(topology, RankingStrategy::Greedy)
            .with_limits(BuildLimits::unlimited());
        built(builder.build(adversary, predecessor, hop, 0.5).unwrap())
    }

    fn sorted(mut nodes: Vec<NodeId>) -> Vec<NodeId> {
        nodes.sort_unstable();
        nodes
    }

    #[test]
    fn test_fixture_levels() {
        let topology = size_14();
        let tree = build(&topology, 6, 7, 5);

        assert_eq!(tree.height(), 6);
        assert_eq!(tree.level(0), Some(vec![6]));
        assert_eq!(tree.level(1), Some(vec![7]));
        assert_eq!(tree.level(2), Some(vec![4]));
        assert_eq!(sorted(tree.level(3).unwrap()), vec![1, 5, 10]);
        assert_eq!(sorted(tree.level(4).unwrap()), vec![9, 13]);
        assert_eq!(tree.level(5), Some(vec![0]));
        assert_eq!(tree.level(6), None);
    }

    #[test]
    fn test_fixture_sender_set() {
        let topology = size_14();
        let tree = build(&topology, 6, 7, 5);
        let expected: Vec<NodeId> = (0..14).filter(|&n| n != 6).collect();
        assert_eq!(sorted(tree.sender_set().to_vec()), expected);
    }

    #[test]
    fn test_fixture_bracket() {
        let topology = size_14();
        let tree = build(&topology, 7, 4, 2);
        assert_eq!(tree.to_bracket(), "(7--1(4--1(5--1)(10--1)(1--1)))");
    }

    #[test]
    fn test_widening_accepts_lower_ranked_edge() {
        // Node 7 ranks 12 third, so rank-1 expansion alone stalls at 12
        let topology = size_14();
        let tree = build(&topology, 6, 12, 3);
        assert_eq!(tree.to_bracket(), "(6--1(12--1(7--3(4--1))))");
        assert_eq!(tree.height(), 4);
    }

    #[test]
    fn test_isolated_predecessor_terminates() {
        let topology = pair();
        let tree = build(&topology, 0, 1, 3);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.sender_set(), &[1]);
        assert_eq!(tree.to_bracket(), "(0--1(1--1))");
    }

    #[test]
    fn test_paths_never_repeat_nodes() {
        let topology = size_14();
        for (adversary, predecessor, hop) in [(6, 7, 5), (6, 12, 4), (7, 4, 4), (9, 3, 5)] {
            let tree = build(&topology, adversary, predecessor, hop);
            for index in 0..tree.entries().len() {
                let path: Vec<NodeId> = tree.path_to_root(index).collect();
                let unique: HashSet<NodeId> = path.iter().copied().collect();
                assert_eq!(path.len(), unique.len(), "repeated node in {:?}", path);
            }
            let reached: HashSet<NodeId> = tree.entries()[PREDECESSOR..].iter().map(|e| e.node).collect();
            let senders: HashSet<NodeId> = tree.sender_set().iter().copied().collect();
            assert!(reached.is_subset(&senders));
        }
    }

    #[test]
    fn test_work_ceiling_abstains() {
        let topology = size_14();
        // ceil(36 / 14) = 3, 3^5 = 243 > 2 * 14
        let builder = TreeBuilder::new(&topology, RankingStrategy::Greedy);
        assert_eq!(builder.estimated_work(5), 243);
        match builder.build(6, 7, 5, 0.5).unwrap() {
            BuildOutcome::Abstained { estimated_work, reason } => {
                assert_eq!(estimated_work, 243);
                assert_eq!(reason, AbstainReason::WorkLimit);
            }
            BuildOutcome::Built(_) => panic!("expected abstention"),
        }
    }

    #[test]
    fn test_depth_limit_abstains() {
        let topology = size_14();
        let builder = TreeBuilder::new(&topology, RankingStrategy::Greedy).with_limits(BuildLimits {
            max_depth: 4,
            work_multiplier: None,
        });
        let outcome = builder.build(6, 7, 5, 0.5).unwrap();
        assert!(matches!(
            outcome,
            BuildOutcome::Abstained { reason: AbstainReason::DepthLimit, .. }
        ));
        assert!(builder.build(6, 7, 4, 0.5).unwrap().tree().is_some());
    }

    #[test]
    fn test_zero_hop_is_rejected() {
        let topology = diamond();
        let builder = TreeBuilder::new(&topology, RankingStrategy::Greedy)
            .with_limits(BuildLimits::unlimited());
        assert_eq!(
            builder.build(0, 1, 0, 0.5).unwrap_err(),
            AnalysisError::InvalidHop { node: 0, hop: 0 }
        );

        // One hop is the smallest valid interception: the predecessor alone
        let tree = built(builder.build(0, 1, 1, 0.5).unwrap());
        assert_eq!(tree.sender_set(), &[1]);
        assert_eq!(tree.sender_set_rank().top(), Some((1, &[1][..])));
    }

    #[test]
    fn test_unknown_nodes_are_rejected() {
        let topology = size_14();
        let builder = TreeBuilder::new(&topology, RankingStrategy::Greedy);
        assert_eq!(
            builder.build(6, 99, 3, 0.5).unwrap_err(),
            AnalysisError::UnknownNode(99)
        );
    }
}
