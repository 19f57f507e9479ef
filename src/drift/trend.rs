//! Trend statistics over drift history.

use super::types::{DriftHistoryEntry, DriftTrend};

/// Compute trend statistics for `entries`, oldest first.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn compute_trend(entries: &[&DriftHistoryEntry]) -> DriftTrend {
    let n = entries.len();
    if n == 0 {
        return DriftTrend::default();
    }

    let points: Vec<(f64, f64)> = entries
        .iter()
        .map(|entry| (entry.turn as f64, entry.score))
        .collect();

    let mean = points.iter().map(|(_, y)| y).sum::<f64>() / n as f64;
    let std_dev = if n < 2 {
        0.0
    } else {
        let variance = points.iter().map(|(_, y)| (y - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    };

    let slope = least_squares_slope(&points);
    let acceleration = if n < 4 {
        0.0
    } else {
        let half = n / 2;
        least_squares_slope(&points[n - half..]) - least_squares_slope(&points[..half])
    };

    DriftTrend {
        mean,
        std_dev,
        slope,
        is_increasing: slope > 0.0,
        velocity: slope,
        acceleration,
        samples: n,
    }
}

/// Least-squares slope of `y` against `x`. Zero with fewer than two points
/// or when every `x` is equal.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn least_squares_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_x2: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n_f * sum_xy - sum_x * sum_y) / denominator
}
