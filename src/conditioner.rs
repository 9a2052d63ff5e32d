//! 1-D signal cleanup shared by every pipeline
//!
//! Each operation takes one column and returns a new column of the same
//! length. Undefined samples (dropouts, rejected jumps) are refilled by linear
//! interpolation over sample index, with the nearest valid value held at both
//! ends.

use crate::config::ConditionerConfig;
use crate::error::Result;
use crate::filters::ButterworthLowpass;
use crate::smoothing::{self, SmoothingMode};

pub struct SignalConditioner {
    config: ConditionerConfig,
}

impl SignalConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.config
    }

    /// Replace samples equal to `sentinel` and refill them.
    ///
    /// A series with no valid sample at all is returned as-is.
    pub fn repair_dropouts(&self, values: &[f64], sentinel: f64) -> Vec<f64> {
        let marked: Vec<Option<f64>> = values
            .iter()
            .map(|&v| (v != sentinel && v.is_finite()).then_some(v))
            .collect();
        let dropped = marked.iter().filter(|v| v.is_none()).count();
        if dropped > 0 {
            log::debug!("repair_dropouts: refilling {dropped}/{} samples", values.len());
        }
        interpolate_gaps(&marked).unwrap_or_else(|| {
            log::warn!(
                "repair_dropouts: all {} samples are dropouts, leaving series unchanged",
                values.len()
            );
            values.to_vec()
        })
    }

    /// Drop samples that change by more than `threshold` from their predecessor.
    ///
    /// Jumps are found on the diffs of the input, so removing one sample never
    /// causes its successor to be flagged.
    pub fn reject_jumps(&self, values: &[f64], threshold: f64) -> Vec<f64> {
        let flags = jump_flags(values, threshold);
        let rejected = flags.iter().filter(|&&f| f).count();
        if rejected == 0 {
            return values.to_vec();
        }
        log::debug!("reject_jumps: {rejected} samples exceed {threshold}");

        let marked: Vec<Option<f64>> = values
            .iter()
            .zip(flags.iter())
            .map(|(&v, &jump)| (!jump).then_some(v))
            .collect();
        interpolate_gaps(&marked).unwrap_or_else(|| values.to_vec())
    }

    /// Zero-phase Butterworth low-pass of the configured order.
    pub fn lowpass(&self, values: &[f64], cutoff_hz: f64, sample_rate_hz: f64) -> Result<Vec<f64>> {
        let lpf = ButterworthLowpass::design(self.config.lowpass_order, cutoff_hz, sample_rate_hz)?;
        Ok(lpf.filtfilt(values))
    }

    pub fn adaptive_smooth(&self, values: &[f64], n_points: usize) -> (Vec<f64>, SmoothingMode) {
        let (out, mode) = smoothing::adaptive_smooth(values, n_points, &self.config);
        if mode == SmoothingMode::Sparse {
            log::info!(
                "adaptive_smooth: sparse scan ({n_points} <= {} samples), median window {} only",
                self.config.dense_threshold,
                self.config.sparse_median_window
            );
        }
        (out, mode)
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(ConditionerConfig::default())
    }
}

/// `true` where `|v[i] - v[i-1]| > threshold`. The first sample is never a jump.
pub fn jump_flags(values: &[f64], threshold: f64) -> Vec<bool> {
    let mut flags = vec![false; values.len()];
    for i in 1..values.len() {
        flags[i] = (values[i] - values[i - 1]).abs() > threshold;
    }
    flags
}

/// Fill `None` entries by linear interpolation over index.
///
/// Leading and trailing gaps take the nearest valid value. Returns `None`
/// when there is nothing to interpolate from.
pub fn interpolate_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let valid: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();
    let (&first, &last) = (valid.first()?, valid.last()?);

    let mut out = Vec::with_capacity(values.len());
    let mut next = 0; // index into `valid` of the first valid sample >= i
    for (i, v) in values.iter().enumerate() {
        if let Some(v) = v {
            out.push(*v);
            next += 1;
            continue;
        }
        let filled = if i < first {
            values[first]
        } else if i > last {
            values[last]
        } else {
            let (lo, hi) = (valid[next - 1], valid[next]);
            let (a, b) = (values[lo]?, values[hi]?);
            Some(a + (b - a) * (i - lo) as f64 / (hi - lo) as f64)
        };
        out.push(filled?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_interpolate_gaps_interior_and_edges() {
        let out = interpolate_gaps(&[None, Some(2.0), None, None, Some(8.0), None]).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], 2.0);
        assert_abs_diff_eq!(out[2], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[3], 6.0, epsilon = 1e-12);
        assert_eq!(out[5], 8.0);
    }

    #[test]
    fn test_interpolate_gaps_nothing_valid() {
        assert_eq!(interpolate_gaps(&[None, None]), None);
        assert_eq!(interpolate_gaps(&[]), None);
    }

    #[test]
    fn test_repair_dropouts() {
        let conditioner = SignalConditioner::default();
        let out = conditioner.repair_dropouts(&[0.0, 60.0, 0.0, 64.0, 0.0], 0.0);
        assert_eq!(out, vec![60.0, 60.0, 62.0, 64.0, 64.0]);
    }

    #[test]
    fn test_repair_dropouts_single_valid_sample_covers_everything() {
        let conditioner = SignalConditioner::default();
        let out = conditioner.repair_dropouts(&[0.0, 0.0, 70.0, 0.0], 0.0);
        assert_eq!(out, vec![70.0; 4]);
    }

    #[test]
    fn test_repair_dropouts_all_sentinel_unchanged() {
        let conditioner = SignalConditioner::default();
        assert_eq!(conditioner.repair_dropouts(&[0.0, 0.0], 0.0), vec![0.0, 0.0]);
    }

    #[test]
    fn test_reject_jumps_uses_original_diffs() {
        let conditioner = SignalConditioner::default();
        // 100 is a jump up (diff 90), and 12 is a jump down from 100 (diff 88)
        // on the original series. 14 stays because 12 -> 14 is small.
        let values = [10.0, 100.0, 12.0, 14.0];
        assert_eq!(jump_flags(&values, 25.0), vec![false, true, true, false]);
        let out = conditioner.reject_jumps(&values, 25.0);
        assert_abs_diff_eq!(out[1], 11.333_333_333_333, epsilon = 1e-9);
        assert_abs_diff_eq!(out[2], 12.666_666_666_667, epsilon = 1e-9);
        assert_eq!(out[3], 14.0);
    }

    #[test]
    fn test_reject_jumps_repaired_values_pass_recheck() {
        let conditioner = SignalConditioner::default();
        let values = [50.0, 51.0, 120.0, 52.0, 53.0, 54.0];
        let out = conditioner.reject_jumps(&values, 25.0);
        let flags = jump_flags(&values, 25.0);
        for (i, flagged) in flags.iter().enumerate() {
            if *flagged {
                assert!((out[i] - out[i - 1]).abs() <= 25.0);
            }
        }
    }

    #[test]
    fn test_lowpass_rejects_cutoff_at_nyquist() {
        let conditioner = SignalConditioner::default();
        assert!(conditioner.lowpass(&[1.0; 32], 50.0, 100.0).is_err());
    }

    #[test]
    fn test_lowpass_constant() {
        let conditioner = SignalConditioner::default();
        let out = conditioner.lowpass(&[2.0; 64], 2.0, 100.0).unwrap();
        for v in out {
            assert_abs_diff_eq!(v, 2.0, epsilon = 1e-9);
        }
    }
}
