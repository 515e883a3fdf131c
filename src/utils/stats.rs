//! Small numeric helpers shared by the analyzers and the aggregator

use std::f64::consts::SQRT_2;

/// Standard normal CDF via `libm::erf`
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + libm::erf(z / SQRT_2))
}

/// P(X < threshold) for X ~ N(mean, sd). A non-positive sd degenerates to a step.
pub fn prob_below(threshold: f64, mean: f64, sd: f64) -> f64 {
    if sd <= 0.0 {
        return if threshold > mean { 1.0 } else { 0.0 };
    }
    normal_cdf((threshold - mean) / sd)
}

pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Arithmetic mean, 0.0 for an empty input
pub fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Round to two decimals for display
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normal_cdf_reference_points() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-3);
        assert_relative_eq!(normal_cdf(-1.0), 0.1587, epsilon = 1e-3);
    }

    #[test]
    fn test_prob_below_degenerate_sd() {
        assert_eq!(prob_below(10.0, 5.0, 0.0), 1.0);
        assert_eq!(prob_below(5.0, 10.0, 0.0), 0.0);
    }

    #[test]
    fn test_clamp_and_mean() {
        assert_eq!(clamp01(1.4), 1.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(mean(Vec::<f64>::new()), 0.0);
        assert_relative_eq!(mean([0.2, 0.4]), 0.3, epsilon = 1e-12);
    }
}
