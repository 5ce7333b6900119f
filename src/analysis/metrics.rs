//! Anonymity scoring and run-level aggregation.
//!
//! Each analyzed message is scored once and folded into a
//! [`MetricAccumulator`]. Accumulators only hold counts and running sums, so
//! per-worker partial results can be merged in any order before the final
//! metrics are computed.

use std::collections::BTreeMap;

use super::types::{AnonymitySet, HopSummary, MetricFamily, MetricValue, RoutingRecord};
use crate::routing::{ChoiceTable, Distribution, RankClasses};
use crate::topology::{NodeId, TopologySet};
use crate::utils::math::{percent, round_to};
use crate::utils::stats::RunningStats;

/// How the most likely sender compares with the true source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BestProbability {
    /// The source has the highest probability (ties count)
    Hit,
    /// The source is absent or has probability 0
    Miss,
    /// The source is below the maximum by this much
    Gap(f64),
}

/// Compare the source's probability with the largest in `distribution`.
///
/// A source with probability 0 is a `Miss`, even when every entry is 0.
/// Only `Gap` outcomes feed the averaged probability gap; hits and misses
/// are left out of it.
pub fn best_probability(distribution: &Distribution, source: NodeId) -> BestProbability {
    match (distribution.get(source), distribution.max()) {
        (Some(p), Some(max)) if p > 0.0 => {
            if p >= max {
                BestProbability::Hit
            } else {
                BestProbability::Gap(max - p)
            }
        }
        _ => BestProbability::Miss,
    }
}

/// Where the true source landed in the rank classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankAccuracy {
    TopHit,
    Miss,
    /// Score distance from the top class
    Behind(u32),
}

pub fn rank_accuracy(classes: &RankClasses, source: NodeId) -> RankAccuracy {
    match (classes.top(), classes.score_of(source)) {
        (Some((top, _)), Some(score)) if score == top => RankAccuracy::TopHit,
        (Some((top, _)), Some(score)) => RankAccuracy::Behind(score - top),
        _ => RankAccuracy::Miss,
    }
}

/// 1-based position of the class holding `source`, 0 when unranked
pub fn relative_rank(classes: &RankClasses, source: NodeId) -> usize {
    classes
        .iter()
        .position(|(_, nodes)| nodes.contains(&source))
        .map_or(0, |index| index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyScore {
    pub entropy: f64,
    pub normalized: f64,
    pub max: f64,
}

impl EntropyScore {
    pub fn of(distribution: &Distribution) -> Self {
        Self {
            entropy: distribution.entropy(),
            normalized: distribution.normalized_entropy(),
            max: distribution.max_entropy(),
        }
    }
}

/// Scores for one calculated anonymity set
#[derive(Debug, Clone, PartialEq)]
pub struct MessageScore {
    pub sender_set_size: usize,
    pub sender_set_missed: bool,
    pub backoff: EntropyScore,
    pub best: BestProbability,
    pub actual: Option<(EntropyScore, BestProbability)>,
    pub rank: RankAccuracy,
    pub relative_rank: usize,
    pub top_rank_size: usize,
    pub top_rank_value: u32,
}

impl MessageScore {
    /// Score a calculated set against the true source; `None` for sets
    /// that were not calculated
    pub fn from_set(set: &AnonymitySet, source: NodeId) -> Option<Self> {
        if !set.calculated {
            return None;
        }
        let full_set = set.full_set.as_ref()?;
        let backoff = set.probability_set.as_ref()?;
        let classes = set.ranked_set.as_ref()?;
        let (top_rank_value, top_rank_size) = classes
            .top()
            .map_or((0, 0), |(score, nodes)| (score, nodes.len()));

        Some(Self {
            sender_set_size: full_set.length,
            sender_set_missed: !full_set.nodes.contains(&source),
            backoff: EntropyScore::of(backoff),
            best: best_probability(backoff, source),
            actual: set
                .probability_set_actual
                .as_ref()
                .map(|d| (EntropyScore::of(d), best_probability(d, source))),
            rank: rank_accuracy(classes, source),
            relative_rank: relative_rank(classes, source),
            top_rank_size,
            top_rank_value,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct EntropyStats {
    entropy: RunningStats,
    normalized: RunningStats,
    max: RunningStats,
}

impl EntropyStats {
    fn push(&mut self, score: &EntropyScore) {
        self.entropy.push(score.entropy);
        self.normalized.push(score.normalized);
        self.max.push(score.max);
    }

    fn merge(&mut self, other: &EntropyStats) {
        self.entropy.merge(&other.entropy);
        self.normalized.merge(&other.normalized);
        self.max.merge(&other.max);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct AccuracyStats {
    scored: u64,
    missed: u64,
    hits: u64,
    gap: RunningStats,
}

impl AccuracyStats {
    fn push(&mut self, outcome: BestProbability) {
        self.scored += 1;
        match outcome {
            BestProbability::Hit => self.hits += 1,
            BestProbability::Miss => self.missed += 1,
            BestProbability::Gap(gap) => self.gap.push(gap),
        }
    }

    fn merge(&mut self, other: &AccuracyStats) {
        self.scored += other.scored;
        self.missed += other.missed;
        self.hits += other.hits;
        self.gap.merge(&other.gap);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct HopStats {
    intercepted: u64,
    calculated: u64,
    top_rank_hits: u64,
    best_hits: u64,
    normalized_entropy: RunningStats,
}

impl HopStats {
    fn merge(&mut self, other: &HopStats) {
        self.intercepted += other.intercepted;
        self.calculated += other.calculated;
        self.top_rank_hits += other.top_rank_hits;
        self.best_hits += other.best_hits;
        self.normalized_entropy.merge(&other.normalized_entropy);
    }
}

/// Mergeable partial aggregate over analyzed messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricAccumulator {
    messages: u64,
    delivered: u64,
    failed: u64,
    routing_length: RunningStats,
    circuit_length: RunningStats,

    intercepted: u64,
    calculated: u64,
    intercept_hop: RunningStats,
    intercept_hops: BTreeMap<usize, u64>,
    by_hop: BTreeMap<usize, HopStats>,

    sender_set_size: RunningStats,
    sender_set_missed: u64,
    backoff: EntropyStats,
    actual: EntropyStats,
    top_rank_size: RunningStats,
    top_rank_value: RunningStats,

    best: AccuracyStats,
    best_actual: AccuracyStats,
    rank_missed: u64,
    top_rank_hits: u64,
    rank_diff: RunningStats,
    relative_rank: RunningStats,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a message that was analyzed without error
    pub fn observe(&mut self, record: &RoutingRecord) {
        self.messages += 1;
        if record.delivered.unwrap_or(false) {
            self.delivered += 1;
        }
        self.routing_length.push(record.routing_path.length as f64);
        self.circuit_length.push(record.connection_path.length as f64);

        let Some(set) = &record.anonymity_set else {
            return;
        };
        self.intercepted += 1;
        self.intercept_hop.push(set.hop as f64);
        *self.intercept_hops.entry(set.hop).or_insert(0) += 1;
        let hop_stats = self.by_hop.entry(set.hop).or_default();
        hop_stats.intercepted += 1;

        let Some(score) = MessageScore::from_set(set, record.source_node) else {
            return;
        };
        self.calculated += 1;
        hop_stats.calculated += 1;
        hop_stats.normalized_entropy.push(score.backoff.normalized);
        if score.best == BestProbability::Hit {
            hop_stats.best_hits += 1;
        }
        if score.rank == RankAccuracy::TopHit {
            hop_stats.top_rank_hits += 1;
        }

        self.sender_set_size.push(score.sender_set_size as f64);
        if score.sender_set_missed {
            self.sender_set_missed += 1;
        }
        self.backoff.push(&score.backoff);
        self.best.push(score.best);
        if let Some((entropy, best)) = &score.actual {
            self.actual.push(entropy);
            self.best_actual.push(*best);
        }
        self.top_rank_size.push(score.top_rank_size as f64);
        self.top_rank_value.push(f64::from(score.top_rank_value));

        match score.rank {
            RankAccuracy::TopHit => {
                self.top_rank_hits += 1;
                self.rank_diff.push(0.0);
            }
            RankAccuracy::Behind(diff) => self.rank_diff.push(f64::from(diff)),
            RankAccuracy::Miss => self.rank_missed += 1,
        }
        self.relative_rank.push(score.relative_rank as f64);
    }

    /// Count a message whose analysis failed
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn merge(&mut self, other: &MetricAccumulator) {
        self.messages += other.messages;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.routing_length.merge(&other.routing_length);
        self.circuit_length.merge(&other.circuit_length);

        self.intercepted += other.intercepted;
        self.calculated += other.calculated;
        self.intercept_hop.merge(&other.intercept_hop);
        for (hop, count) in &other.intercept_hops {
            *self.intercept_hops.entry(*hop).or_insert(0) += count;
        }
        for (hop, stats) in &other.by_hop {
            self.by_hop.entry(*hop).or_default().merge(stats);
        }

        self.sender_set_size.merge(&other.sender_set_size);
        self.sender_set_missed += other.sender_set_missed;
        self.backoff.merge(&other.backoff);
        self.actual.merge(&other.actual);
        self.top_rank_size.merge(&other.top_rank_size);
        self.top_rank_value.merge(&other.top_rank_value);

        self.best.merge(&other.best);
        self.best_actual.merge(&other.best_actual);
        self.rank_missed += other.rank_missed;
        self.top_rank_hits += other.top_rank_hits;
        self.rank_diff.merge(&other.rank_diff);
        self.relative_rank.merge(&other.relative_rank);
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn intercepted(&self) -> u64 {
        self.intercepted
    }

    pub fn calculated(&self) -> u64 {
        self.calculated
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn intercept_hops(&self) -> &BTreeMap<usize, u64> {
        &self.intercept_hops
    }

    /// Compute the final metric families
    pub fn finalize(&self, topologies: &TopologySet, choices: Option<&ChoiceTable>) -> Vec<MetricFamily> {
        let mut families = vec![
            self.routing_family(),
            self.adversary_family(),
            self.sender_set_family(),
            self.anonymity_family(),
            self.accuracy_family(),
            graph_family(topologies),
        ];
        if let Some(table) = choices {
            families.push(choice_family(table));
        }
        families
    }

    pub fn hop_summaries(&self) -> Vec<HopSummary> {
        self.by_hop
            .iter()
            .map(|(hop, stats)| HopSummary {
                hop: *hop,
                intercepted: stats.intercepted,
                calculated: stats.calculated,
                top_rank_hit_percent: clean(percent(stats.top_rank_hits as usize, stats.calculated as usize)),
                best_entropy_hit_percent: clean(percent(stats.best_hits as usize, stats.calculated as usize)),
                normalized_entropy_avg: clean(stats.normalized_entropy.mean()),
            })
            .collect()
    }

    fn routing_family(&self) -> MetricFamily {
        family(
            "routing",
            vec![
                metric("M_c", "message_count", self.messages as f64),
                metric("D_c", "delivered_count", self.delivered as f64),
                metric("D_p", "delivered_percent", ratio(self.delivered, self.messages)),
                metric("PR_a", "path_length_routing_avg", self.routing_length.mean()),
                metric("PR_s", "path_length_routing_std", self.routing_length.std()),
                metric("PC_a", "path_length_circuit_avg", self.circuit_length.mean()),
                metric("PC_s", "path_length_circuit_std", self.circuit_length.std()),
            ],
        )
    }

    fn adversary_family(&self) -> MetricFamily {
        family(
            "adversary",
            vec![
                metric("I_c", "messages_intercepted", self.intercepted as f64),
                metric("I_p", "messages_intercepted_percent", ratio(self.intercepted, self.messages)),
                metric("SC_c", "sender_sets_calculable", self.calculated as f64),
                metric(
                    "SC_p",
                    "sender_sets_calculable_percent_of_intercepted",
                    ratio(self.calculated, self.intercepted),
                ),
                metric(
                    "SC_t",
                    "sender_sets_calculable_percent_of_total",
                    ratio(self.calculated, self.messages),
                ),
                metric("IH_a", "intercept_hop_avg", self.intercept_hop.mean()),
                metric("IH_s", "intercept_hop_std", self.intercept_hop.std()),
                metric("E_c", "messages_failed", self.failed as f64),
            ],
        )
    }

    fn sender_set_family(&self) -> MetricFamily {
        family(
            "sender_set",
            vec![
                metric("SS_a", "sender_set_size_avg", self.sender_set_size.mean()),
                metric("SS_s", "sender_set_size_std", self.sender_set_size.std()),
                metric("SS_M_c", "sender_set_missed_count", self.sender_set_missed as f64),
                metric(
                    "SS_M_p",
                    "sender_set_missed_percent",
                    ratio(self.sender_set_missed, self.calculated),
                ),
            ],
        )
    }

    fn anonymity_family(&self) -> MetricFamily {
        let b = &self.backoff;
        let a = &self.actual;
        family(
            "anonymity",
            vec![
                metric("EN_a", "entropy_avg", b.entropy.mean()),
                metric("EN_s", "entropy_std", b.entropy.std()),
                metric("EN_N_a", "normalized_entropy_avg", b.normalized.mean()),
                metric("EN_N_s", "normalized_entropy_std", b.normalized.std()),
                metric("EN_M_a", "max_entropy_avg", b.max.mean()),
                metric("EN_M_s", "max_entropy_std", b.max.std()),
                metric("EN_A_a", "entropy_actual_avg", a.entropy.mean()),
                metric("EN_A_s", "entropy_actual_std", a.entropy.std()),
                metric("EN_N_A_a", "normalized_entropy_actual_avg", a.normalized.mean()),
                metric("EN_N_A_s", "normalized_entropy_actual_std", a.normalized.std()),
                metric("EN_M_A_a", "max_entropy_actual_avg", a.max.mean()),
                metric("EN_M_A_s", "max_entropy_actual_std", a.max.std()),
                metric("TR_S_a", "top_rank_set_size_avg", self.top_rank_size.mean()),
                metric("TR_S_s", "top_rank_set_size_std", self.top_rank_size.std()),
                metric("TR_V_a", "top_rank_value_avg", self.top_rank_value.mean()),
                metric("TR_V_s", "top_rank_value_std", self.top_rank_value.std()),
            ],
        )
    }

    fn accuracy_family(&self) -> MetricFamily {
        let best = &self.best;
        let actual = &self.best_actual;
        family(
            "accuracy",
            vec![
                metric("EN_T", "entropy_calculated_count", best.scored as f64),
                metric("EN_M_c", "entropy_missed_source_node_count", best.missed as f64),
                metric("EN_M_p", "entropy_missed_source_node_percent", ratio(best.missed, best.scored)),
                metric("EN_BH_c", "best_entropy_hit_count", best.hits as f64),
                metric("EN_BH_p", "best_entropy_hit_percent", ratio(best.hits, best.scored)),
                metric("EN_D_a", "best_entropy_diff_avg", best.gap.mean()),
                metric("EN_D_s", "best_entropy_diff_std", best.gap.std()),
                metric("EN_A_BH_c", "best_entropy_actual_hit_count", actual.hits as f64),
                metric(
                    "EN_A_BH_p",
                    "best_entropy_actual_hit_percent",
                    ratio(actual.hits, actual.scored),
                ),
                metric("EN_A_D_a", "best_entropy_actual_diff_avg", actual.gap.mean()),
                metric("EN_A_D_s", "best_entropy_actual_diff_std", actual.gap.std()),
                metric("R_M_c", "rank_missed_source_node_count", self.rank_missed as f64),
                metric(
                    "R_M_p",
                    "rank_missed_source_node_percent",
                    ratio(self.rank_missed, self.calculated),
                ),
                metric("TR_H_c", "top_rank_hit_count", self.top_rank_hits as f64),
                metric("TR_H_p", "top_rank_hit_percent", ratio(self.top_rank_hits, self.calculated)),
                metric("R_D_a", "rank_diff_avg", self.rank_diff.mean()),
                metric("R_D_s", "rank_diff_std", self.rank_diff.std()),
                metric("RR_H_a", "relative_rank_hit_avg", self.relative_rank.mean()),
                metric("RR_H_s", "relative_rank_hit_std", self.relative_rank.std()),
            ],
        )
    }
}

fn graph_family(topologies: &TopologySet) -> MetricFamily {
    let mut degree_avg = RunningStats::new();
    let mut degree_std = RunningStats::new();
    let mut diameter = RunningStats::new();
    let mut nodes = RunningStats::new();
    let mut edges = RunningStats::new();
    let mut adversaries = RunningStats::new();
    let mut node_total = 0;
    let mut adversary_total = 0;
    for topology in topologies.iter() {
        let stats = topology.stats();
        degree_avg.push(stats.degree_avg);
        degree_std.push(stats.degree_std);
        diameter.push(stats.diameter as f64);
        nodes.push(stats.node_count as f64);
        edges.push(stats.edge_count as f64);
        adversaries.push(stats.adversary_count as f64);
        node_total += stats.node_count;
        adversary_total += stats.adversary_count;
    }

    family(
        "graph",
        vec![
            metric("DEG_a", "degree_avg", degree_avg.mean()),
            // Average of the per-snapshot degree spread
            metric("DEG_s", "degree_std", degree_std.mean()),
            metric("DIA_a", "diameter_avg", diameter.mean()),
            metric("DIA_s", "diameter_std", diameter.std()),
            metric("N_a", "node_count_avg", nodes.mean()),
            metric("N_s", "node_count_std", nodes.std()),
            metric("ED_a", "edge_count_avg", edges.mean()),
            metric("ED_s", "edge_count_std", edges.std()),
            metric("A_p", "adversary_count_percent", percent(adversary_total, node_total)),
            metric("A_a", "adversary_count_avg", adversaries.mean()),
            metric("A_s", "adversary_count_std", adversaries.std()),
        ],
    )
}

fn choice_family(table: &ChoiceTable) -> MetricFamily {
    family(
        "routing_choice",
        table
            .iter()
            .map(|(rank, pct)| {
                metric(
                    &format!("C_{}_a", rank),
                    &format!("Choice_{}_avg", rank),
                    pct / 100.0,
                )
            })
            .collect(),
    )
}

fn family(name: &str, metrics: Vec<MetricValue>) -> MetricFamily {
    MetricFamily {
        name: name.to_string(),
        metrics,
    }
}

fn metric(short: &str, long: &str, value: f64) -> MetricValue {
    MetricValue {
        short: short.to_string(),
        long: long.to_string(),
        value: clean(value),
    }
}

/// Reported values are rounded to 5 places; NaN and infinities become 0
fn clean(value: f64) -> f64 {
    if value.is_finite() {
        round_to(value, 5)
    } else {
        0.0
    }
}

fn ratio(selected: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    selected as f64 / total as f64
}
