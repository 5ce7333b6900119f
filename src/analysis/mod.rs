//! Sender anonymity analysis over recorded routing paths.
//!
//! Records are read from JSON lines, every intercepted message gets a
//! sender set with ranked and probabilistic views, and the run is summarized
//! into metric families.

pub mod calculator;
pub mod metrics;
pub mod records;
pub mod report;
pub mod routing_choice;
pub mod types;

pub use calculator::{first_interception, BatchResult, Interception, SenderSetCalculator};
pub use metrics::MetricAccumulator;
pub use records::{read_records, write_records};
pub use report::{build_report, generate_json_report, generate_text_report};
pub use routing_choice::load_choice_table;
pub use types::*;
