//! Running statistics that can be updated one sample at a time and merged
//! across workers.

use serde::{Deserialize, Serialize};

/// Count, sum and sum of squares of a stream of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: u64,
    pub sum: f64,
    pub sum_sq: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample, ignoring NaN
    pub fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Fold another partial aggregate into this one
    pub fn merge(&mut self, other: &RunningStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    /// Mean of the samples, 0.0 when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Sample standard deviation (n - 1 denominator), 0.0 with fewer than two samples
    pub fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        // Cancellation can push a zero variance slightly negative
        variance.max(0.0).sqrt()
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        let mut stats = RunningStats::new();
        for value in iter {
            stats.push(value);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = RunningStats::new();
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.std(), 0.0);
    }

    #[test]
    fn test_mean_and_sample_std() {
        let stats: RunningStats = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        assert_eq!(stats.count, 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        // Sample variance = 32 / 7
        assert!((stats.std() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_nan_is_skipped() {
        let stats: RunningStats = [1.0, f64::NAN, 3.0].into_iter().collect();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean(), 2.0);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let all: RunningStats = [1.0, 2.0, 3.0, 10.0].into_iter().collect();
        let mut left: RunningStats = [1.0, 2.0].into_iter().collect();
        let right: RunningStats = [3.0, 10.0].into_iter().collect();
        left.merge(&right);
        assert_eq!(left, all);
    }
}
