//! Butterworth low-pass design and zero-phase application
//!
//! The filter is a cascade of second-order sections designed with the
//! bilinear transform (cutoff pre-warped), plus one first-order section for
//! odd orders. `filtfilt` runs the cascade forward then backward over an
//! odd-extended copy of the signal, with section states primed to the edge
//! value, so the result has no phase delay and no start-up transient.

use std::f64::consts::PI;

use crate::error::{MapperError, Result};

/// One section in Direct Form II Transposed.
///
/// H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    /// Second-order low-pass section with quality factor `q`, `k = tan(π fc / fs)`.
    fn lowpass(k: f64, q: f64) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);
        let b0 = k2 * norm;
        Self {
            b: [b0, 2.0 * b0, b0],
            a: [2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        }
    }

    /// First-order low-pass section (b2 = a2 = 0).
    fn lowpass_first_order(k: f64) -> Self {
        let norm = 1.0 / (1.0 + k);
        Self {
            b: [k * norm, k * norm, 0.0],
            a: [(k - 1.0) * norm, 0.0],
        }
    }

    pub fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// State that makes a constant input `x0` produce a constant output.
    fn steady_state(&self, x0: f64) -> [f64; 2] {
        let y0 = self.dc_gain() * x0;
        [y0 - self.b[0] * x0, self.b[2] * x0 - self.a[1] * y0]
    }

    fn run(&self, signal: &mut [f64], mut state: [f64; 2]) {
        for sample in signal.iter_mut() {
            let x = *sample;
            let y = self.b[0] * x + state[0];
            state[0] = self.b[1] * x - self.a[0] * y + state[1];
            state[1] = self.b[2] * x - self.a[1] * y;
            *sample = y;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ButterworthLowpass {
    order: usize,
    sections: Vec<Biquad>,
}

impl ButterworthLowpass {
    /// Design an `order`-th order low-pass at `cutoff_hz` for a stream sampled
    /// at `sample_rate_hz`.
    ///
    /// Fails with `InvalidFilterConfig` unless `0 < cutoff_hz < sample_rate_hz / 2`.
    /// The cutoff is never clamped.
    pub fn design(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self> {
        let valid = cutoff_hz.is_finite()
            && sample_rate_hz.is_finite()
            && cutoff_hz > 0.0
            && cutoff_hz < sample_rate_hz / 2.0;
        if !valid {
            return Err(MapperError::InvalidFilterConfig {
                cutoff_hz,
                sample_rate_hz,
            });
        }
        if order == 0 {
            return Err(MapperError::InvalidInput(
                "Butterworth order must be at least 1".to_string(),
            ));
        }

        let k = (PI * cutoff_hz / sample_rate_hz).tan();
        let mut sections = Vec::with_capacity(order.div_ceil(2));
        // Conjugate pole pairs of the analog prototype
        for i in 1..=order / 2 {
            let angle = (2 * i - 1) as f64 * PI / (2 * order) as f64;
            let q = 1.0 / (2.0 * angle.sin());
            sections.push(Biquad::lowpass(k, q));
        }
        if order % 2 == 1 {
            sections.push(Biquad::lowpass_first_order(k));
        }

        Ok(Self { order, sections })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn dc_gain(&self) -> f64 {
        self.sections.iter().map(Biquad::dc_gain).product()
    }

    /// Single causal pass, states primed to the first sample.
    pub fn filter(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        self.run_primed(&mut out);
        out
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The signal is padded on both ends by odd reflection (3 × (order + 1)
    /// samples, shortened for very short inputs). Inputs with fewer than two
    /// samples are returned unchanged.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n < 2 {
            return signal.to_vec();
        }
        let pad = (3 * (self.order + 1)).min(n - 1);

        let first = signal[0];
        let last = signal[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        self.run_primed(&mut ext);
        ext.reverse();
        self.run_primed(&mut ext);
        ext.reverse();

        ext[pad..pad + n].to_vec()
    }

    fn run_primed(&self, signal: &mut [f64]) {
        let Some(&x0) = signal.first() else {
            return;
        };
        let mut level = x0;
        for section in &self.sections {
            section.run(signal, section.steady_state(level));
            level *= section.dc_gain();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_design_rejects_cutoff_above_nyquist() {
        let err = ButterworthLowpass::design(4, 25.0, 50.0).unwrap_err();
        assert!(matches!(err, MapperError::InvalidFilterConfig { .. }));
        assert!(ButterworthLowpass::design(4, 30.0, 50.0).is_err());
        assert!(ButterworthLowpass::design(4, 0.0, 50.0).is_err());
        assert!(ButterworthLowpass::design(4, 24.9, 50.0).is_ok());
    }

    #[test]
    fn test_section_count() {
        assert_eq!(ButterworthLowpass::design(4, 2.0, 100.0).unwrap().sections().len(), 2);
        assert_eq!(ButterworthLowpass::design(3, 2.0, 100.0).unwrap().sections().len(), 2);
        assert_eq!(ButterworthLowpass::design(1, 2.0, 100.0).unwrap().sections().len(), 1);
    }

    #[test]
    fn test_unity_dc_gain() {
        for order in 1..=6 {
            let lpf = ButterworthLowpass::design(order, 2.0, 100.0).unwrap();
            assert_abs_diff_eq!(lpf.dc_gain(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_second_order_coefficients() {
        // fc = fs/4 gives k = 1; with q = 1/sqrt(2) the textbook values are
        // b = [0.2929, 0.5858, 0.2929], a = [0, 0.1716]
        let lpf = ButterworthLowpass::design(2, 25.0, 100.0).unwrap();
        let s = lpf.sections()[0];
        assert_abs_diff_eq!(s.b[0], 0.292_893_218_8, epsilon = 1e-9);
        assert_abs_diff_eq!(s.b[1], 0.585_786_437_6, epsilon = 1e-9);
        assert_abs_diff_eq!(s.a[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.a[1], 0.171_572_875_3, epsilon = 1e-9);
    }

    #[test]
    fn test_filtfilt_constant_passthrough() {
        let lpf = ButterworthLowpass::design(4, 2.0, 100.0).unwrap();
        let out = lpf.filtfilt(&vec![3.5; 200]);
        assert_eq!(out.len(), 200);
        for v in out {
            assert_abs_diff_eq!(v, 3.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_filtfilt_attenuates_high_frequency() {
        let fs = 100.0;
        let lpf = ButterworthLowpass::design(4, 2.0, fs).unwrap();
        let signal: Vec<f64> = (0..1000)
            .map(|i| (2.0 * PI * 20.0 * i as f64 / fs).sin())
            .collect();
        let out = lpf.filtfilt(&signal);
        let peak = out[100..900].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(peak < 1e-3, "20 Hz tone leaked through: {peak}");
    }

    #[test]
    fn test_filtfilt_has_no_phase_delay() {
        let fs = 100.0;
        let lpf = ButterworthLowpass::design(4, 5.0, fs).unwrap();
        // 0.5 Hz sine, peak at i = 50 (t = 0.5 s)
        let signal: Vec<f64> = (0..400)
            .map(|i| (2.0 * PI * 0.5 * i as f64 / fs).sin())
            .collect();
        let out = lpf.filtfilt(&signal);
        let argmax = (0..200)
            .max_by(|&a, &b| out[a].total_cmp(&out[b]))
            .unwrap();
        assert!((argmax as i64 - 50).abs() <= 1, "peak moved to {argmax}");
    }

    #[test]
    fn test_filtfilt_short_inputs() {
        let lpf = ButterworthLowpass::design(4, 2.0, 100.0).unwrap();
        assert!(lpf.filtfilt(&[]).is_empty());
        assert_eq!(lpf.filtfilt(&[1.5]), vec![1.5]);
        let out = lpf.filtfilt(&[1.0, 2.0, 3.0]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
