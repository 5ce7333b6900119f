//! Per-message sender-set calculation and the parallel batch driver.

use rayon::prelude::*;
use regex::Regex;

use super::metrics::MetricAccumulator;
use super::types::{AnonymitySet, FullSet, RoutingPath, RoutingRecord};
use crate::error::AnalysisError;
use crate::routing::{
    distribution, top_rank_distribution, BuildLimits, BuildOutcome, CandidateTree, ChoiceTable,
    EdgeModel, RankingStrategy, TreeBuilder,
};
use crate::topology::{NodeId, TopologySet};
use crate::utils::math;

/// Output of a batch run
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Analyzed records, in input order
    pub records: Vec<RoutingRecord>,
    pub metrics: MetricAccumulator,
    /// Records rejected by the message type filter
    pub filtered: usize,
}

/// Where the first adversary sits on a routing path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interception {
    pub adversary: NodeId,
    pub predecessor: NodeId,
    pub hop: usize,
}

/// Locate the first adversary on `path`.
///
/// Returns `Ok(None)` when no adversary saw the message. The hop is the
/// recorded hop count, falling back to the position on the path, and must
/// be at least 1.
pub fn first_interception(path: &RoutingPath) -> Result<Option<Interception>, AnalysisError> {
    let Some(index) = path.path.iter().position(|hop| hop.is_adversary) else {
        return Ok(None);
    };
    let adversary = &path.path[index];
    if index == 0 {
        return Err(AnalysisError::AdversaryIsSource { node: adversary.id });
    }
    let hop = adversary.hop.unwrap_or(index);
    if hop == 0 {
        return Err(AnalysisError::InvalidHop {
            node: adversary.id,
            hop,
        });
    }
    Ok(Some(Interception {
        adversary: adversary.id,
        predecessor: path.path[index - 1].id,
        hop,
    }))
}

/// Computes anonymity sets for recorded messages
#[derive(Debug, Clone, Copy)]
pub struct SenderSetCalculator<'a> {
    topologies: &'a TopologySet,
    strategy: RankingStrategy,
    limits: BuildLimits,
    choice_table: Option<&'a ChoiceTable>,
}

impl<'a> SenderSetCalculator<'a> {
    pub fn new(topologies: &'a TopologySet, strategy: RankingStrategy) -> Self {
        Self {
            topologies,
            strategy,
            limits: BuildLimits::default(),
            choice_table: None,
        }
    }

    pub fn with_limits(mut self, limits: BuildLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Also compute the distribution fitted to observed routing choices
    pub fn with_choice_table(mut self, table: &'a ChoiceTable) -> Self {
        self.choice_table = Some(table);
        self
    }

    /// Analyze one record, returning a copy with `distance` and
    /// `anonymity_set` filled in
    pub fn process(&self, record: &RoutingRecord) -> Result<RoutingRecord, AnalysisError> {
        let topology = self.topologies.closest(record.cycle)?;
        let mut analyzed = record.clone();

        if analyzed.distance.is_none() {
            if let (Ok(source), Ok(destination)) = (
                topology.location(record.source_node),
                topology.location(record.destination_node),
            ) {
                analyzed.distance = Some(math::distance(source, destination));
            }
        }

        let Some(interception) = first_interception(&record.routing_path)? else {
            analyzed.anonymity_set = None;
            return Ok(analyzed);
        };

        let outcome = TreeBuilder::new(topology, self.strategy)
            .with_limits(self.limits)
            .build(
                interception.adversary,
                interception.predecessor,
                interception.hop,
                record.target,
            )?;
        analyzed.anonymity_set = Some(match outcome {
            BuildOutcome::Built(tree) => self.describe(&tree),
            BuildOutcome::Abstained {
                estimated_work,
                reason,
            } => AnonymitySet::not_calculated(interception.hop, estimated_work, reason),
        });
        Ok(analyzed)
    }

    fn describe(&self, tree: &CandidateTree) -> AnonymitySet {
        let mut nodes = tree.sender_set().to_vec();
        nodes.sort_unstable();
        AnonymitySet {
            calculated: true,
            hop: tree.hop(),
            estimated_work: tree.estimated_work(),
            skipped: None,
            tree: Some(tree.to_bracket()),
            full_set: Some(FullSet {
                length: nodes.len(),
                nodes,
            }),
            ranked_set: Some(tree.sender_set_rank()),
            probability_set: Some(distribution(tree, EdgeModel::ExponentialBackoff)),
            probability_set_actual: self
                .choice_table
                .map(|table| distribution(tree, EdgeModel::Empirical(table))),
            probability_set_top_rank: Some(top_rank_distribution(tree)),
        }
    }

    /// Analyze a batch in parallel.
    ///
    /// Records whose message type does not match `filter` are dropped and
    /// counted. Records missing a type are kept. Messages that fail
    /// analysis are logged, counted, and left out of the output.
    pub fn analyze_batch(&self, records: Vec<RoutingRecord>, filter: &Regex) -> BatchResult {
        let total = records.len();
        let selected: Vec<RoutingRecord> = records
            .into_iter()
            .filter(|record| {
                record
                    .message_type
                    .as_deref()
                    .map_or(true, |kind| filter.is_match(kind))
            })
            .collect();
        let filtered = total - selected.len();
        if filtered > 0 {
            log::info!("Filtered out {} records by message type", filtered);
        }

        let outcomes: Vec<Result<RoutingRecord, AnalysisError>> = selected
            .par_iter()
            .map(|record| {
                self.process(record).map_err(|e| {
                    log::warn!(
                        "Skipping message {} -> {} in cycle {}: {}",
                        record.source_node,
                        record.destination_node,
                        record.cycle,
                        e
                    );
                    e
                })
            })
            .collect();

        let metrics = outcomes
            .par_iter()
            .fold(MetricAccumulator::new, |mut acc, outcome| {
                match outcome {
                    Ok(record) => acc.observe(record),
                    Err(_) => acc.record_failure(),
                }
                acc
            })
            .reduce(MetricAccumulator::new, |mut left, right| {
                left.merge(&right);
                left
            });

        let records: Vec<RoutingRecord> = outcomes.into_iter().filter_map(Result::ok).collect();
        log::info!(
            "Analyzed {} messages: {} intercepted, {} sender sets calculated, {} failed",
            records.len(),
            metrics.intercepted(),
            metrics.calculated(),
            metrics.failed()
        );

        BatchResult {
            records,
            metrics,
            filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::PathHop;
    use crate::routing::test_support::size_14;
    use crate::routing::AbstainReason;
    use std::collections::BTreeMap;

    fn hop(id: NodeId, adversary: bool, hop: usize) -> PathHop {
        PathHop {
            id,
            is_adversary: adversary,
            hop: Some(hop),
            extra: Default::default(),
        }
    }

    fn record(source: NodeId, destination: NodeId, path: Vec<PathHop>) -> RoutingRecord {
        RoutingRecord {
            cycle: 0,
            source_node: source,
            destination_node: destination,
            target: 0.5,
            routing_path: RoutingPath {
                length: path.len(),
                path,
                extra: Default::default(),
            },
            connection_path: Default::default(),
            message_type: Some("Ping".to_string()),
            delivered: Some(true),
            distance: None,
            anonymity_set: None,
            extra: Default::default(),
        }
    }

    fn topologies() -> TopologySet {
        let mut set = TopologySet::new();
        set.insert(size_14());
        set
    }

    #[test]
    fn test_first_interception() {
        let path = record(5, 7, vec![hop(5, false, 0), hop(4, false, 1), hop(7, true, 2)]).routing_path;
        assert_eq!(
            first_interception(&path).unwrap(),
            Some(Interception {
                adversary: 7,
                predecessor: 4,
                hop: 2
            })
        );

        let clean = record(5, 4, vec![hop(5, false, 0), hop(4, false, 1)]).routing_path;
        assert_eq!(first_interception(&clean).unwrap(), None);

        let from_adversary = record(6, 7, vec![hop(6, true, 0), hop(7, false, 1)]).routing_path;
        assert_eq!(
            first_interception(&from_adversary),
            Err(AnalysisError::AdversaryIsSource { node: 6 })
        );
    }

    #[test]
    fn test_hop_falls_back_to_path_position() {
        let mut r = record(5, 7, vec![hop(5, false, 0), hop(4, false, 1), hop(7, true, 2)]);
        r.routing_path.path[2].hop = None;
        let interception = first_interception(&r.routing_path).unwrap().unwrap();
        assert_eq!(interception.hop, 2);
    }

    #[test]
    fn test_recorded_zero_hop_is_rejected() {
        let r = record(5, 7, vec![hop(5, false, 0), hop(4, false, 0), hop(7, true, 0)]);
        assert_eq!(
            first_interception(&r.routing_path),
            Err(AnalysisError::InvalidHop { node: 7, hop: 0 })
        );

        let topologies = topologies();
        let calculator = SenderSetCalculator::new(&topologies, RankingStrategy::Greedy);
        let filter = Regex::new("^(?:Ping)$").unwrap();
        let result = calculator.analyze_batch(vec![r], &filter);
        assert!(result.records.is_empty());
        assert_eq!(result.metrics.failed(), 1);
    }

    #[test]
    fn test_process_calculates_set() {
        let topologies = topologies();
        let calculator = SenderSetCalculator::new(&topologies, RankingStrategy::Greedy);
        let r = record(5, 7, vec![hop(5, false, 0), hop(4, false, 1), hop(7, true, 2)]);

        let analyzed = calculator.process(&r).unwrap();
        assert!((analyzed.distance.unwrap() - 0.08).abs() < 1e-9);

        let set = analyzed.anonymity_set.unwrap();
        assert!(set.calculated);
        assert_eq!(set.hop, 2);
        assert_eq!(set.estimated_work, 9);
        assert_eq!(set.full_set.unwrap().nodes, vec![1, 4, 5, 10]);
        assert_eq!(set.ranked_set.unwrap().top(), Some((2, &[1, 5, 10][..])));
        let probabilities = set.probability_set.unwrap();
        assert!((probabilities.get(5).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert!(set.probability_set_actual.is_none());
        assert_eq!(set.tree.as_deref(), Some("(7--1(4--1(5--1)(10--1)(1--1)))"));
    }

    #[test]
    fn test_process_with_choice_table() {
        let topologies = topologies();
        let table = ChoiceTable::new(BTreeMap::from([(1, 80.0), (2, 20.0)]));
        let calculator =
            SenderSetCalculator::new(&topologies, RankingStrategy::Greedy).with_choice_table(&table);
        let r = record(5, 7, vec![hop(5, false, 0), hop(4, false, 1), hop(7, true, 2)]);

        let set = calculator.process(&r).unwrap().anonymity_set.unwrap();
        let actual = set.probability_set_actual.unwrap();
        assert!((actual.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_limits_abstain_on_deep_hop() {
        let topologies = topologies();
        let calculator = SenderSetCalculator::new(&topologies, RankingStrategy::Greedy);
        let r = record(
            0,
            6,
            vec![
                hop(0, false, 0),
                hop(13, false, 1),
                hop(5, false, 2),
                hop(4, false, 3),
                hop(7, false, 4),
                hop(6, true, 5),
            ],
        );

        let set = calculator.process(&r).unwrap().anonymity_set.unwrap();
        assert!(!set.calculated);
        assert_eq!(set.hop, 5);
        assert_eq!(set.estimated_work, 243);
        assert_eq!(set.skipped, Some(AbstainReason::WorkLimit));
    }

    #[test]
    fn test_unintercepted_message_has_no_set() {
        let topologies = topologies();
        let calculator = SenderSetCalculator::new(&topologies, RankingStrategy::Greedy);
        let r = record(5, 4, vec![hop(5, false, 0), hop(4, false, 1)]);
        assert!(calculator.process(&r).unwrap().anonymity_set.is_none());
    }

    #[test]
    fn test_batch_filters_and_counts_failures() {
        let topologies = topologies();
        let calculator = SenderSetCalculator::new(&topologies, RankingStrategy::Greedy);
        let intercepted = record(5, 7, vec![hop(5, false, 0), hop(4, false, 1), hop(7, true, 2)]);
        let failing = record(6, 7, vec![hop(6, true, 0), hop(7, false, 1)]);
        let mut pong = intercepted.clone();
        pong.message_type = Some("Pong".to_string());
        let mut untyped = record(5, 4, vec![hop(5, false, 0), hop(4, false, 1)]);
        untyped.message_type = None;

        let filter = Regex::new("^(?:Ping)$").unwrap();
        let result = calculator.analyze_batch(vec![intercepted, pong, failing, untyped], &filter);

        assert_eq!(result.filtered, 1);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].source_node, 5);
        assert!(result.records[0].anonymity_set.is_some());
        assert!(result.records[1].anonymity_set.is_none());
        assert_eq!(result.metrics.messages(), 2);
        assert_eq!(result.metrics.intercepted(), 1);
        assert_eq!(result.metrics.failed(), 1);
    }
}
