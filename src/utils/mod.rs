//! Shared utilities: circular distance, entropy, running statistics.

pub mod math;
pub mod stats;

pub use math::{distance, entropy, max_entropy, percent, round_to};
pub use stats::RunningStats;
