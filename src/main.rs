//! Sender-set anonymity analysis CLI.
//!
//! Reconstructs candidate senders for messages intercepted by adversaries
//! in simulated greedy-routing overlays and reports how anonymous the
//! senders were.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};

use anonset::analysis::{self, ReportMetadata};
use anonset::config::AnalysisConfig;
use anonset::config_loader;
use anonset::routing::{
    distribution, top_rank_distribution, BuildLimits, BuildOutcome, ChoiceTable, EdgeModel,
    TreeBuilder,
};
use anonset::topology::{NodeId, TopologySet};

#[derive(Parser, Debug)]
#[command(name = "anonset")]
#[command(about = "Sender-set anonymity analysis for simulated DHT routing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    threads: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute anonymity sets for every intercepted message and report metrics
    Analyze {
        /// Analysis configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// GML snapshot file or directory of snapshots
        #[arg(short, long)]
        topology: PathBuf,

        /// Routing records, one JSON object per line
        #[arg(short, long)]
        routes: PathBuf,

        /// Output directory for augmented records and reports
        #[arg(short, long, default_value = "anonymity_output")]
        output: PathBuf,

        /// Observed routing-choice frequencies for the empirical distribution
        #[arg(long)]
        routing_choice: Option<PathBuf>,
    },

    /// Build and print the candidate tree for a single interception
    Tree {
        /// Analysis configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// GML snapshot file or directory of snapshots
        #[arg(short, long)]
        topology: PathBuf,

        /// Cycle used to pick the snapshot
        #[arg(long, default_value = "0")]
        cycle: u64,

        /// Node that intercepted the message
        #[arg(long)]
        adversary: NodeId,

        /// Neighbor the adversary received the message from
        #[arg(long)]
        predecessor: NodeId,

        /// Hops the message travelled before interception
        #[arg(long)]
        hop: usize,

        /// Address the message was routed towards
        #[arg(long)]
        target: f64,

        /// Ignore the configured depth and work limits
        #[arg(long)]
        unlimited: bool,

        /// Observed routing-choice frequencies for the empirical distribution
        #[arg(long)]
        routing_choice: Option<PathBuf>,
    },

    /// Print graph statistics for each topology snapshot
    Topology {
        /// GML snapshot file or directory of snapshots
        #[arg(short, long)]
        topology: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Analyze {
            config,
            topology,
            routes,
            output,
            routing_choice,
        } => run_analyze(
            config.as_deref(),
            &topology,
            &routes,
            &output,
            routing_choice.as_deref(),
        ),
        Commands::Tree {
            config,
            topology,
            cycle,
            adversary,
            predecessor,
            hop,
            target,
            unlimited,
            routing_choice,
        } => {
            let config = config_loader::load_or_default(config.as_deref())?;
            let request = TreeRequest {
                cycle,
                adversary,
                predecessor,
                hop,
                target,
                unlimited,
            };
            run_tree(&config, &topology, &request, routing_choice.as_deref())
        }
        Commands::Topology { topology } => run_topology(&topology),
    }
}

fn run_analyze(
    config_path: Option<&Path>,
    topology_path: &Path,
    routes_path: &Path,
    output_dir: &Path,
    routing_choice: Option<&Path>,
) -> Result<()> {
    let config = config_loader::load_or_default(config_path)?;
    let strategy = config.ranking_strategy()?;
    let filter = config.message_filter()?;

    log::info!("Loading topology from {}...", topology_path.display());
    let topologies = TopologySet::load(topology_path)?;
    let choices = routing_choice.map(analysis::load_choice_table).transpose()?;

    log::info!("Reading routing records from {}...", routes_path.display());
    let batch = analysis::read_records(routes_path)?;
    let records_read = batch.records.len();

    let mut calculator = analysis::SenderSetCalculator::new(&topologies, strategy)
        .with_limits(config.build_limits());
    if let Some(table) = choices.as_ref() {
        calculator = calculator.with_choice_table(table);
    }
    log::info!("Analyzing {} records with {} router...", records_read, strategy);
    let result = calculator.analyze_batch(batch.records, &filter);

    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory {}", output_dir.display())
    })?;
    let stem = routes_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("routes");
    analysis::write_records(&output_dir.join(format!("{}_anonymity.json", stem)), &result.records)?;

    let metadata = ReportMetadata {
        analysis_timestamp: chrono::Utc::now().to_rfc3339(),
        routes_file: routes_path.display().to_string(),
        topology_path: topology_path.display().to_string(),
        router: strategy.to_string(),
        snapshots: topologies.len(),
        records_read,
        records_malformed: batch.malformed,
        records_filtered: result.filtered,
    };
    let report = analysis::build_report(metadata, &result.metrics, &topologies, choices.as_ref());
    analysis::generate_json_report(&report, &output_dir.join("anonymity_report.json"))?;
    analysis::generate_text_report(&report, &output_dir.join("anonymity_report.txt"))?;

    analysis::report::print_summary(&report);
    log::info!("Analysis complete. Reports written to {}", output_dir.display());
    Ok(())
}

#[derive(Debug)]
struct TreeRequest {
    cycle: u64,
    adversary: NodeId,
    predecessor: NodeId,
    hop: usize,
    target: f64,
    unlimited: bool,
}

fn run_tree(
    config: &AnalysisConfig,
    topology_path: &Path,
    request: &TreeRequest,
    routing_choice: Option<&Path>,
) -> Result<()> {
    let topologies = TopologySet::load(topology_path)?;
    let topology = topologies.closest(request.cycle)?;
    let choices: Option<ChoiceTable> = routing_choice.map(analysis::load_choice_table).transpose()?;

    let limits = if request.unlimited {
        BuildLimits::unlimited()
    } else {
        config.build_limits()
    };
    let outcome = TreeBuilder::new(topology, config.ranking_strategy()?)
        .with_limits(limits)
        .build(request.adversary, request.predecessor, request.hop, request.target)?;

    let tree = match outcome {
        BuildOutcome::Built(tree) => tree,
        BuildOutcome::Abstained {
            estimated_work,
            reason,
        } => {
            return Err(eyre!(
                "Tree not built ({:?}, estimated work {}); rerun with --unlimited",
                reason,
                estimated_work
            ))
        }
    };

    println!("Tree: {}", tree.to_bracket());
    println!("Height: {}", tree.height());
    let mut depth = 0;
    while let Some(level) = tree.level(depth) {
        println!("  depth {}: {:?}", depth, level);
        depth += 1;
    }

    let mut senders = tree.sender_set().to_vec();
    senders.sort_unstable();
    println!("Sender set ({}): {:?}", senders.len(), senders);

    println!("Rank classes:");
    for (score, nodes) in tree.sender_set_rank().iter() {
        println!("  {}: {:?}", score, nodes);
    }

    let backoff = distribution(&tree, EdgeModel::ExponentialBackoff);
    println!(
        "Backoff distribution (entropy {:.4}, normalized {:.4}):",
        backoff.entropy(),
        backoff.normalized_entropy()
    );
    for (node, p) in backoff.iter().filter(|(_, p)| *p > 0.0) {
        println!("  {}: {:.5}", node, p);
    }

    if let Some(table) = choices.as_ref() {
        let actual = distribution(&tree, EdgeModel::Empirical(table));
        println!("Empirical distribution (entropy {:.4}):", actual.entropy());
        for (node, p) in actual.iter().filter(|(_, p)| *p > 0.0) {
            println!("  {}: {:.5}", node, p);
        }
    }

    let top = top_rank_distribution(&tree);
    println!("Top rank distribution (entropy {:.4})", top.entropy());
    Ok(())
}

fn run_topology(topology_path: &Path) -> Result<()> {
    let topologies = TopologySet::load(topology_path)?;
    println!(
        "{:>8} {:>8} {:>8} {:>6} {:>10} {:>10} {:>9} {:>11}",
        "Cycle", "Nodes", "Edges", "Adv", "DegAvg", "DegStd", "Diameter", "Components"
    );
    for topology in topologies.iter() {
        let stats = topology.stats();
        println!(
            "{:>8} {:>8} {:>8} {:>6} {:>10.3} {:>10.3} {:>9} {:>11}",
            stats.cycle,
            stats.node_count,
            stats.edge_count,
            stats.adversary_count,
            stats.degree_avg,
            stats.degree_std,
            stats.diameter,
            stats.connected_components
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::parse_from([
            "anonset", "-j", "4", "analyze", "--topology", "graphs", "--routes", "routes.json",
        ]);
        assert_eq!(cli.threads, 4);
        match cli.command {
            Commands::Analyze {
                topology, output, config, ..
            } => {
                assert_eq!(topology, PathBuf::from("graphs"));
                assert_eq!(output, PathBuf::from("anonymity_output"));
                assert!(config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_tree() {
        let cli = Cli::parse_from([
            "anonset", "tree", "-t", "g.gml", "--adversary", "6", "--predecessor", "7", "--hop",
            "5", "--target", "0.5", "--unlimited", "--log-level", "debug",
        ]);
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Tree {
                adversary,
                predecessor,
                hop,
                unlimited,
                cycle,
                ..
            } => {
                assert_eq!((adversary, predecessor, hop), (6, 7, 5));
                assert!(unlimited);
                assert_eq!(cycle, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_tree_requires_target() {
        let result = Cli::try_parse_from([
            "anonset", "tree", "-t", "g.gml", "--adversary", "6", "--predecessor", "7", "--hop",
            "5",
        ]);
        assert!(result.is_err());
    }
}
