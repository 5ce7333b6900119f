//! Rank-class partition of a sender set.
//!
//! Each path through the tree that reaches the deepest level is scored
//! `1 + sum of its edge ranks`; lower scores are paths a router is more
//! likely to have taken. A node keeps the lowest score of any path
//! ending at it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::tree::{CandidateTree, PREDECESSOR};
use crate::topology::NodeId;

/// Sender-set members grouped by path score, best score first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankClasses {
    classes: BTreeMap<u32, Vec<NodeId>>,
}

impl RankClasses {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[NodeId])> {
        self.classes.iter().map(|(score, nodes)| (*score, nodes.as_slice()))
    }

    /// The best-scored class
    pub fn top(&self) -> Option<(u32, &[NodeId])> {
        self.iter().next()
    }

    pub fn get(&self, score: u32) -> Option<&[NodeId]> {
        self.classes.get(&score).map(Vec::as_slice)
    }

    /// Score of the class containing `node`
    pub fn score_of(&self, node: NodeId) -> Option<u32> {
        self.iter()
            .find(|(_, nodes)| nodes.contains(&node))
            .map(|(score, _)| score)
    }
}

impl CandidateTree {
    /// Partition the sender set into rank classes.
    ///
    /// Trees without a predecessor level yield no classes. A tree that stops
    /// at the predecessor ranks it alone at score 1. Sender-set members that
    /// no deepest-level path reaches share one class scored after the worst
    /// reached class.
    pub fn sender_set_rank(&self) -> RankClasses {
        let height = self.height();
        if height < 2 {
            return RankClasses::default();
        }

        let mut best: HashMap<NodeId, u32> = HashMap::new();
        match self.predecessor() {
            Some(predecessor) if height == 2 => {
                best.insert(predecessor, 1);
            }
            _ => {
                let deepest = height - 1;
                let mut stack = vec![(PREDECESSOR, 1u32)];
                while let Some((index, score)) = stack.pop() {
                    let Some(entry) = self.entry(index) else {
                        continue;
                    };
                    for &child in &entry.children {
                        let child_entry = &self.entries()[child];
                        let child_score = score + child_entry.rank;
                        if child_entry.depth == deepest {
                            best.entry(child_entry.node)
                                .and_modify(|s| *s = (*s).min(child_score))
                                .or_insert(child_score);
                        } else {
                            stack.push((child, child_score));
                        }
                    }
                }
            }
        }

        let mut classes: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
        for (&node, &score) in &best {
            classes.entry(score).or_default().push(node);
        }
        let worst = classes.keys().next_back().copied().unwrap_or(0);
        let unreached: Vec<NodeId> = self
            .sender_set()
            .iter()
            .copied()
            .filter(|node| !best.contains_key(node))
            .collect();
        if !unreached.is_empty() {
            classes.insert(worst + 1, unreached);
        }
        for nodes in classes.values_mut() {
            nodes.sort_unstable();
        }
        RankClasses { classes }
    }
}
