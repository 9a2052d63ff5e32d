//! Numerical integration primitives for dead reckoning
//! Every function consumes a whole series and returns a new one of equal length

use crate::config::IntegrationMethod;

/// Mean spacing of consecutive timestamps.
///
/// Returns `None` for fewer than two samples or when the spacing is not a
/// positive finite number (e.g. every timestamp identical).
pub fn mean_dt(times: &[f64]) -> Option<f64> {
    if times.len() < 2 {
        return None;
    }
    let span: f64 = times.windows(2).map(|w| w[1] - w[0]).sum();
    let dt = span / (times.len() - 1) as f64;
    if dt.is_finite() && dt > 0.0 {
        Some(dt)
    } else {
        None
    }
}

/// Running sum of `values * dt` (first output is `values[0] * dt`).
pub fn cumulative_sum(values: &[f64], dt: f64) -> Vec<f64> {
    let mut acc = 0.0;
    values
        .iter()
        .map(|v| {
            acc += v * dt;
            acc
        })
        .collect()
}

/// Cumulative trapezoid rule with an initial value of zero.
pub fn cumulative_trapezoid(values: &[f64], dt: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut acc = 0.0;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            acc += 0.5 * (values[i - 1] + v) * dt;
        }
        out.push(acc);
    }
    out
}

pub fn integrate(values: &[f64], dt: f64, method: IntegrationMethod) -> Vec<f64> {
    match method {
        IntegrationMethod::Rectangular => cumulative_sum(values, dt),
        IntegrationMethod::Trapezoid => cumulative_trapezoid(values, dt),
    }
}

/// Subtract the straight line through the first and last sample.
///
/// After this the series starts and ends at zero, which is the "returns to
/// rest" assumption used for velocity drift.
pub fn detrend_endpoints(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let first = values[0];
    let slope = (values[n - 1] - first) / (n - 1) as f64;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| v - (first + slope * i as f64))
        .collect()
}

/// Subtract the least-squares line fitted over sample index.
pub fn detrend_least_squares(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        let mean = values.iter().sum::<f64>() / n.max(1) as f64;
        return values.iter().map(|v| v - mean).collect();
    }
    let nf = n as f64;
    let mean_i = (nf - 1.0) / 2.0;
    let mean_v = values.iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, v) in values.iter().enumerate() {
        let di = i as f64 - mean_i;
        cov += di * (v - mean_v);
        var += di * di;
    }
    let slope = cov / var;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| v - (mean_v + slope * (i as f64 - mean_i)))
        .collect()
}

/// Zero-velocity update: magnitudes below `threshold` become exactly zero.
pub fn zero_small(values: &[f64], threshold: f64) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.abs() < threshold { 0.0 } else { v })
        .collect()
}

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mean_dt() {
        assert_eq!(mean_dt(&[]), None);
        assert_eq!(mean_dt(&[1.0]), None);
        assert_eq!(mean_dt(&[2.0, 2.0, 2.0]), None);
        assert_abs_diff_eq!(mean_dt(&[0.0, 0.1, 0.3]).unwrap(), 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_cumulative_sum() {
        let out = cumulative_sum(&[1.0, 1.0, 1.0], 0.5);
        assert_eq!(out, vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_cumulative_trapezoid_starts_at_zero() {
        let out = cumulative_trapezoid(&[0.0, 2.0, 4.0], 1.0);
        assert_eq!(out, vec![0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_detrend_endpoints_pins_ends() {
        let out = detrend_endpoints(&[1.0, 5.0, 3.0, 7.0]);
        assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[3], 0.0, epsilon = 1e-12);
        // line through (0,1) and (3,7) is 1 + 2i
        assert_abs_diff_eq!(out[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_detrend_least_squares_removes_line() {
        let line: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * i as f64).collect();
        for v in detrend_least_squares(&line) {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_small() {
        assert_eq!(zero_small(&[0.01, -0.019, 0.02, -0.5], 0.02), vec![0.0, 0.0, 0.02, -0.5]);
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 0), Vec::<f64>::new());
        assert_eq!(linspace(3.0, 1.0, 1), vec![3.0]);
        let pts = linspace(0.0, 1.6, 5);
        assert_eq!(pts.len(), 5);
        for (got, want) in pts.iter().zip([0.0, 0.4, 0.8, 1.2, 1.6]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
        assert_eq!(pts[4], 1.6);
    }
}
