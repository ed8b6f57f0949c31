//! Statistics core - pure numeric functions over ordered series
//!
//! Every function here is deterministic and side-effect free. The memoizer
//! relies on that: caching a result must never change what callers observe.

use serde::{Deserialize, Serialize};

/// Ordinary least squares fit against the implicit index 0..n-1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Values outside the 1.5x IQR fences and their positions in the input
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Outliers {
    pub outliers: Vec<f64>,
    pub indices: Vec<usize>,
}

/// Arithmetic mean (0 for empty input)
pub fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

/// Linear regression of `series` against its index
///
/// Returns all zeros for fewer than two points. `r_squared` is clamped
/// to [0, 1] so numerical noise never reports a negative fit.
pub fn linear_regression(series: &[f64]) -> Regression {
    let n = series.len();
    if n < 2 {
        return Regression::default();
    }

    let n_f = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (i, &y) in series.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n_f * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return Regression::default();
    }

    let slope = (n_f * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n_f;

    let y_mean = sum_y / n_f;
    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for (i, &y) in series.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_tot += (y - y_mean).powi(2);
        ss_res += (y - predicted).powi(2);
    }

    // A constant series is fitted exactly by a flat line
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Regression {
        slope,
        intercept,
        r_squared,
    }
}

/// Population standard deviation (0 for fewer than two points)
pub fn standard_deviation(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let avg = mean(series);
    let variance = series.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / series.len() as f64;
    variance.sqrt()
}

/// Linear-interpolated percentile, `p` in [0, 100]
///
/// Works on a sorted copy; the input order is left untouched.
pub fn percentile(series: &[f64], p: f64) -> f64 {
    if series.is_empty() {
        return 0.0;
    }

    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Pearson correlation coefficient
///
/// Returns 0 when lengths differ, there are fewer than two points, or
/// either side has zero variance.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return 0.0;
    }

    let mean_a = mean(a);
    let mean_b = mean(b);
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;

    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// IQR outlier detection (1.5x interquartile range fences)
pub fn detect_outliers(series: &[f64]) -> Outliers {
    if series.len() < 4 {
        return Outliers::default();
    }

    let q1 = percentile(series, 25.0);
    let q3 = percentile(series, 75.0);
    let iqr = q3 - q1;
    let lower_fence = q1 - 1.5 * iqr;
    let upper_fence = q3 + 1.5 * iqr;

    let mut result = Outliers::default();
    for (i, &value) in series.iter().enumerate() {
        if value < lower_fence || value > upper_fence {
            result.outliers.push(value);
            result.indices.push(i);
        }
    }
    result
}

/// Trailing simple moving average
///
/// Output has `n - window + 1` points; empty when the window is 0 or
/// longer than the series.
pub fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > series.len() {
        return Vec::new();
    }
    series.windows(window).map(mean).collect()
}

/// Coefficient of variation (stddev / |mean|), 0 when the mean is 0
pub fn volatility(series: &[f64]) -> f64 {
    let avg = mean(series);
    if avg == 0.0 {
        return 0.0;
    }
    standard_deviation(series) / avg.abs()
}

/// Indices whose z-score magnitude exceeds `threshold`
pub fn z_score_anomalies(series: &[f64], threshold: f64) -> Vec<usize> {
    let std = standard_deviation(series);
    if std == 0.0 {
        return Vec::new();
    }
    let avg = mean(series);
    series
        .iter()
        .enumerate()
        .filter(|(_, v)| ((*v - avg) / std).abs() > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Seasonal index per phase of `period`
///
/// Each index is the phase average divided by the overall mean, so 1.0
/// means "typical". Needs at least two full periods.
pub fn seasonality_indices(series: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || series.len() < period * 2 {
        return Vec::new();
    }
    let overall = mean(series);
    if overall == 0.0 {
        return Vec::new();
    }

    (0..period)
        .map(|phase| {
            let values: Vec<f64> = series.iter().skip(phase).step_by(period).copied().collect();
            mean(&values) / overall
        })
        .collect()
}

/// Largest peak-to-trough decline of the series, as a positive number
pub fn max_drawdown(series: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in series {
        peak = peak.max(value);
        worst = worst.max(peak - value);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_regression_on_perfect_line() {
        let fit = linear_regression(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert!(approx(fit.slope, 1.0), "slope was {}", fit.slope);
        assert!(approx(fit.intercept, 1.0), "intercept was {}", fit.intercept);
        assert!(approx(fit.r_squared, 1.0), "r2 was {}", fit.r_squared);
    }

    #[test]
    fn test_regression_on_flat_series() {
        let fit = linear_regression(&[5.0, 5.0, 5.0, 5.0]);

        assert!(approx(fit.slope, 0.0));
        assert!(approx(fit.intercept, 5.0));
    }

    #[test]
    fn test_regression_short_input() {
        assert_eq!(linear_regression(&[]), Regression::default());
        assert_eq!(linear_regression(&[42.0]), Regression::default());
    }

    #[test]
    fn test_regression_r_squared_in_range() {
        let fit = linear_regression(&[3.0, -7.0, 12.0, 0.5, -2.0, 9.0]);
        assert!(fit.r_squared >= 0.0 && fit.r_squared <= 1.0);
    }

    #[test]
    fn test_standard_deviation() {
        assert_eq!(standard_deviation(&[7.0]), 0.0);
        // Population stddev of 2,4,4,4,5,5,7,9 is exactly 2
        let std = standard_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!(approx(std, 2.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [10.0, 40.0, 20.0, 30.0];
        assert!(approx(percentile(&data, 0.0), 10.0));
        assert!(approx(percentile(&data, 100.0), 40.0));
        assert!(approx(percentile(&data, 50.0), 25.0));
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(correlation(&a, &[2.0, 4.0, 6.0, 8.0]), 1.0));
        assert!(approx(correlation(&a, &[8.0, 6.0, 4.0, 2.0]), -1.0));
        assert_eq!(correlation(&a, &[1.0, 2.0]), 0.0);
        assert_eq!(correlation(&a, &[3.0, 3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn test_detect_outliers() {
        let data = [10.0, 12.0, 11.0, 13.0, 12.0, 95.0];
        let found = detect_outliers(&data);

        assert_eq!(found.indices, vec![5]);
        assert_eq!(found.outliers, vec![95.0]);
        assert!(detect_outliers(&[1.0, 100.0, 1.0]).indices.is_empty());
    }

    #[test]
    fn test_moving_average_and_drawdown() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(moving_average(&[1.0], 2).is_empty());
        assert!(approx(max_drawdown(&[100.0, 120.0, 90.0, 110.0, 80.0]), 40.0));
    }

    #[test]
    fn test_seasonality_indices() {
        let series = [10.0, 30.0, 10.0, 30.0];
        let indices = seasonality_indices(&series, 2);

        assert_eq!(indices.len(), 2);
        assert!(approx(indices[0], 0.5));
        assert!(approx(indices[1], 1.5));
        assert!(seasonality_indices(&series, 3).is_empty());
    }

    #[test]
    fn test_z_score_anomalies() {
        let mut series = vec![100.0; 20];
        series.push(1000.0);
        assert_eq!(z_score_anomalies(&series, 3.0), vec![20]);
        assert!(z_score_anomalies(&[5.0, 5.0, 5.0], 1.0).is_empty());
    }
}
