//! Address-space distance and information-theoretic helpers.
//!
//! Node locations live on a circular key space `[0, 1)`, so the distance
//! between two locations wraps around at 1.0.

/// Circular distance between two locations in `[0, 1)`
///
/// # Examples
/// ```
/// use anonset::utils::math::distance;
///
/// assert!((distance(0.1, 0.3) - 0.2).abs() < 1e-12);
/// assert!((distance(0.95, 0.05) - 0.1).abs() < 1e-12);
/// ```
pub fn distance(a: f64, b: f64) -> f64 {
    let direct = (a - b).abs();
    direct.min(1.0 - direct)
}

/// Shannon entropy in bits over a probability distribution
///
/// Zero entries contribute nothing; negative or NaN entries are ignored.
pub fn entropy<I>(probabilities: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let sum: f64 = probabilities
        .into_iter()
        .filter(|p| *p > 0.0)
        .map(|p| p * p.log2())
        .sum();
    // -0.0 for a certain outcome reads badly in reports
    if sum == 0.0 {
        0.0
    } else {
        -sum
    }
}

/// Maximum entropy for a set of `set_size` equally likely senders
pub fn max_entropy(set_size: usize) -> f64 {
    if set_size <= 1 {
        return 0.0;
    }
    (set_size as f64).log2()
}

/// Entropy divided by the maximum entropy for the size of the distribution
///
/// The size includes zero-probability entries, since those nodes are still
/// part of the sender set. Returns 0.0 for empty and singleton distributions.
pub fn entropy_normalized(probabilities: &[f64]) -> f64 {
    let max = max_entropy(probabilities.len());
    if max == 0.0 {
        return 0.0;
    }
    (entropy(probabilities.iter().copied()) / max).clamp(0.0, 1.0)
}

/// Fraction `selected / total`, 0.0 when `total` is zero
pub fn percent(selected: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    selected as f64 / total as f64
}

/// Round to a fixed number of decimal places for reporting
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
