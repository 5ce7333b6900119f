//! Sender probability distributions over a candidate tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::tree::{CandidateTree, PREDECESSOR};
use crate::topology::NodeId;
use crate::utils::math::{entropy, entropy_normalized, max_entropy};

/// Observed share of forwarding decisions that went to each preference
/// rank, in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceTable {
    percent: BTreeMap<u32, f64>,
}

impl ChoiceTable {
    pub fn new(percent: BTreeMap<u32, f64>) -> Self {
        Self { percent }
    }

    pub fn is_empty(&self) -> bool {
        self.percent.is_empty()
    }

    pub fn get(&self, rank: u32) -> Option<f64> {
        self.percent.get(&rank).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.percent.iter().map(|(rank, pct)| (*rank, *pct))
    }

    /// Probability that a single hop picked `rank`.
    ///
    /// Ranks past the largest observed rank `R` (observed share `f`) decay
    /// as `f / (2 * (rank - R))`. Unobserved ranks at or below `R` get 0.
    pub fn probability(&self, rank: u32) -> f64 {
        match self.percent.last_key_value() {
            Some((&largest, &share)) if rank > largest => {
                share / (2.0 * f64::from(rank - largest)) / 100.0
            }
            _ => self.get(rank).unwrap_or(0.0) / 100.0,
        }
    }
}

/// Probability that a hop follows an edge of the given rank
#[derive(Debug, Clone, Copy)]
pub enum EdgeModel<'a> {
    /// `0.5 ^ rank`
    ExponentialBackoff,
    /// Fitted to observed routing choices
    Empirical(&'a ChoiceTable),
}

impl EdgeModel<'_> {
    pub fn probability(&self, rank: u32) -> f64 {
        match self {
            EdgeModel::ExponentialBackoff => 0.5f64.powi(rank.min(i32::MAX as u32) as i32),
            EdgeModel::Empirical(table) => table.probability(rank),
        }
    }
}

/// Normalized sender distribution keyed by node id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distribution {
    probabilities: BTreeMap<NodeId, f64>,
}

impl Distribution {
    /// Equal probability for every sender-set member
    pub fn uniform(senders: &[NodeId]) -> Self {
        let share = 1.0 / senders.len() as f64;
        Self {
            probabilities: senders.iter().map(|&node| (node, share)).collect(),
        }
    }

    pub fn get(&self, node: NodeId) -> Option<f64> {
        self.probabilities.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.probabilities.iter().map(|(node, p)| (*node, *p))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.probabilities.values().copied()
    }

    /// Largest probability, `None` when empty
    pub fn max(&self) -> Option<f64> {
        self.values().reduce(f64::max)
    }

    pub fn entropy(&self) -> f64 {
        entropy(self.values())
    }

    pub fn max_entropy(&self) -> f64 {
        max_entropy(self.len())
    }

    /// Entropy over the maximum for this many senders, 0 for `len() <= 1`
    pub fn normalized_entropy(&self) -> f64 {
        entropy_normalized(&self.values().collect::<Vec<f64>>())
    }
}

/// Raw `(node, probability)` per deepest-level path, in walk order.
///
/// Path probability is the product of the edge model over the path's ranks,
/// starting below the predecessor. Nodes reached by several paths appear
/// once per path.
pub fn assign(tree: &CandidateTree, model: EdgeModel<'_>) -> Vec<(NodeId, f64)> {
    let height = tree.height();
    if height < 2 {
        return Vec::new();
    }
    if height == 2 {
        return tree.predecessor().map(|p| vec![(p, 1.0)]).unwrap_or_default();
    }

    let deepest = height - 1;
    let mut emitted = Vec::new();
    let mut stack = vec![(PREDECESSOR, 1.0f64)];
    while let Some((index, probability)) = stack.pop() {
        let Some(entry) = tree.entry(index) else {
            continue;
        };
        // Reverse keeps children in insertion order when popped
        for &child in entry.children.iter().rev() {
            let child_entry = &tree.entries()[child];
            let combined = probability * model.probability(child_entry.rank);
            if child_entry.depth == deepest {
                emitted.push((child_entry.node, combined));
            } else {
                stack.push((child, combined));
            }
        }
    }
    emitted
}

/// Full distribution over the sender set.
///
/// Path probabilities are summed per node and normalized. If every path has
/// zero mass the sender set is treated as uniform. Sender-set members no
/// path reaches get probability 0.
pub fn distribution(tree: &CandidateTree, model: EdgeModel<'_>) -> Distribution {
    let mut probabilities: BTreeMap<NodeId, f64> = BTreeMap::new();
    for (node, p) in assign(tree, model) {
        *probabilities.entry(node).or_insert(0.0) += p;
    }

    let total: f64 = probabilities.values().sum();
    if total > 0.0 {
        for p in probabilities.values_mut() {
            *p /= total;
        }
    } else if !tree.sender_set().is_empty() {
        return Distribution::uniform(tree.sender_set());
    }

    for &node in tree.sender_set() {
        probabilities.entry(node).or_insert(0.0);
    }
    Distribution { probabilities }
}

/// Uniform over the best rank class, zero for the rest of the sender set
pub fn top_rank_distribution(tree: &CandidateTree) -> Distribution {
    let classes = tree.sender_set_rank();
    let Some((_, top)) = classes.top() else {
        return Distribution::default();
    };
    let mut result = Distribution::uniform(top);
    for &node in tree.sender_set() {
        result.probabilities.entry(node).or_insert(0.0);
    }
    result
}
