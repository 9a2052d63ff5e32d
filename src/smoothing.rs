use serde::Serialize;

use crate::config::ConditionerConfig;

/// Which smoothing chain `adaptive_smooth` applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Median followed by a centered rolling mean
    Dense,
    /// Short median only, so short scans are not flattened
    Sparse,
}

/// Samples taken before and after the center of a rolling window.
///
/// Odd windows are symmetric; even windows lean one sample to the left.
fn window_span(window: usize) -> (usize, usize) {
    let window = window.max(1);
    let left = window / 2;
    (left, window - 1 - left)
}

/// Middle element of an odd-length buffer.
fn median_of(buf: &mut [f64]) -> f64 {
    buf.sort_by(|a, b| a.total_cmp(b));
    buf[buf.len() / 2]
}

/// Sliding median over an odd window (even sizes are rounded up).
///
/// The series is zero-padded at both ends, so edge samples see the missing
/// neighbors as zeros.
pub fn median_filter(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let half = window.max(1) / 2;
    let mut buf = Vec::with_capacity(2 * half + 1);
    (0..n)
        .map(|i| {
            buf.clear();
            buf.extend((i as isize - half as isize..=(i + half) as isize).map(|j| {
                usize::try_from(j)
                    .ok()
                    .and_then(|j| values.get(j))
                    .copied()
                    .unwrap_or(0.0)
            }));
            median_of(&mut buf)
        })
        .collect()
}

/// Centered rolling mean with a minimum of one observation per window.
pub fn centered_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let (left, right) = window_span(window);

    // Prefix sums keep this linear in n
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(left);
            let hi = (i + right + 1).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Pick a smoothing chain from the sample count of the scan.
///
/// `n_points` is passed separately from `values` because the decision is about
/// the scan as a whole, which can be longer than the column being smoothed.
pub fn adaptive_smooth(
    values: &[f64],
    n_points: usize,
    config: &ConditionerConfig,
) -> (Vec<f64>, SmoothingMode) {
    if n_points > config.dense_threshold {
        let median = median_filter(values, config.dense_median_window);
        (
            centered_moving_average(&median, config.dense_rolling_window),
            SmoothingMode::Dense,
        )
    } else {
        (
            median_filter(values, config.sparse_median_window),
            SmoothingMode::Sparse,
        )
    }
}
