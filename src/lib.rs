//! # Anonset - Sender-set anonymity analysis for simulated DHT routing
//!
//! This library estimates how well an adversary can identify the sender of a
//! message routed greedily over a small-world overlay.
//!
//! ## Overview
//!
//! Nodes sit at locations on a circular address space. Messages are forwarded
//! greedily towards a target address, and some nodes are adversaries that
//! record every message they see. When an adversary intercepts a message it
//! knows the neighbor it came from and how many hops it travelled. From that
//! alone it can reconstruct the paths the message could have taken and rank
//! the nodes that could have sent it.
//!
//! ## Architecture
//!
//! - `gml_parser`: GML graph parser for topology snapshots
//! - `topology`: Overlay graphs with locations and adversary flags, per cycle
//! - `routing`: Neighbor ranking, candidate-sender trees, rank classes and
//!   sender probability distributions
//! - `analysis`: Routing record I/O, the parallel batch driver, metrics and reports
//! - `config` / `config_loader`: YAML analysis configuration
//! - `utils`: Circular distance, entropy and running statistics
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use anonset::{analysis, config_loader, topology::TopologySet};
//!
//! let config = config_loader::load_config(Path::new("analysis.yaml"))?;
//! let topologies = TopologySet::load(Path::new("topology/"))?;
//! let batch = analysis::read_records(Path::new("routes.json"))?;
//!
//! let calculator = analysis::SenderSetCalculator::new(&topologies, config.ranking_strategy()?)
//!     .with_limits(config.build_limits());
//! let result = calculator.analyze_batch(batch.records, &config.message_filter()?);
//! println!("{} sender sets calculated", result.metrics.calculated());
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! router:
//!   type: greedy
//!   look_ahead: 1        # 1 = greedy, 2 = two-hop lookahead
//! sender_set:
//!   max_depth: 0         # 0 = no hop limit
//!   work_multiplier: 2.0 # skip when estimated work > multiplier * nodes
//! messages:
//!   type_pattern: "Ping"
//! ```
//!
//! ## Error Handling
//!
//! Loading and I/O return `color_eyre::eyre::Result`. Per-message failures
//! are [`error::AnalysisError`] values; the batch driver logs and counts them
//! instead of aborting the run.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod gml_parser;
pub mod routing;
pub mod topology;
pub mod utils;
