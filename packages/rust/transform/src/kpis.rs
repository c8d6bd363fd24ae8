//! Generic derived-metric primitives.
//!
//! Every function here returns `None` rather than zero, infinity, or NaN
//! when the metric is undefined for its inputs.

/// `numerator / denominator`, defined only when both are present, finite,
/// and the denominator is non-zero.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 || !n.is_finite() || !d.is_finite() {
        return None;
    }
    Some(n / d).filter(|v| v.is_finite())
}

/// Period-over-period growth: `(current - previous) / previous`.
pub fn growth_rate(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let (c, p) = (current?, previous?);
    ratio(Some(c - p), Some(p))
}

/// `value / population`, undefined without a non-zero population.
pub fn per_capita(value: Option<f64>, population: Option<u64>) -> Option<f64> {
    ratio(value, population.map(|p| p as f64))
}
