//! Fixed-length resampling of passes and assembly of the pass matrix

use ndarray::Array2;
use serde::Serialize;

use crate::config::ResampleConfig;
use crate::error::{MapperError, Result};
use crate::physics::linspace;
use crate::types::ResampledPass;

/// Evaluate the piecewise-linear interpolant over sample index at `n` evenly
/// spaced positions from `0` to `len - 1`.
///
/// Inputs shorter than two samples are returned unchanged.
pub fn resample_by_index(values: &[f64], n: usize) -> Vec<f64> {
    let len = values.len();
    if len < 2 {
        return values.to_vec();
    }
    let last = (len - 1) as f64;
    (0..n)
        .map(|i| {
            let pos = if n > 1 { i as f64 * last / (n - 1) as f64 } else { 0.0 };
            let lo = pos.floor() as usize;
            if lo >= len - 1 {
                return values[len - 1];
            }
            let frac = pos - lo as f64;
            values[lo] + (values[lo + 1] - values[lo]) * frac
        })
        .collect()
}

pub struct PathResampler {
    config: ResampleConfig,
}

impl PathResampler {
    pub fn new(config: ResampleConfig) -> Self {
        Self { config }
    }

    pub fn target_points(&self) -> usize {
        self.config.target_points
    }

    /// Resample every column of one pass to the target length.
    ///
    /// The second value is `true` when the pass was too short to resample and
    /// was passed through as-is.
    pub fn resample_pass(&self, start_x: f64, x: &[f64], y: &[f64], values: &[f64]) -> (ResampledPass, bool) {
        let n = self.config.target_points;
        let passed_through = values.len() < 2;
        if passed_through {
            log::warn!(
                "pass at x={start_x}: {} samples, too short to resample to {n}",
                values.len()
            );
        }
        let pass = ResampledPass {
            start_x,
            x: resample_by_index(x, n),
            y: resample_by_index(y, n),
            values: resample_by_index(values, n),
        };
        (pass, passed_through)
    }
}

impl Default for PathResampler {
    fn default() -> Self {
        Self::new(ResampleConfig::default())
    }
}

/// Passes stacked as rows, one column per resampled position index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PassMatrix {
    /// Lateral offset of each row.
    pub x_positions: Vec<f64>,
    /// Nominal along-path position of each column.
    pub y_positions: Vec<f64>,
    /// Shape `(passes, points)`.
    pub values: Array2<f64>,
}

impl PassMatrix {
    pub fn from_rows(rows: &[ResampledPass], known_length: f64) -> Result<Self> {
        let width = rows.first().map_or(0, ResampledPass::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(MapperError::InvalidInput(format!(
                "pass at x={} has {} points, expected {}",
                bad.start_x,
                bad.len(),
                width
            )));
        }

        let flat: Vec<f64> = rows.iter().flat_map(|r| r.values.iter().copied()).collect();
        let values = Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| MapperError::InvalidInput(format!("pass matrix shape: {e}")))?;

        Ok(Self {
            x_positions: rows.iter().map(|r| r.start_x).collect(),
            y_positions: linspace(0.0, known_length, width),
            values,
        })
    }

    pub fn passes(&self) -> usize {
        self.values.nrows()
    }

    pub fn points(&self) -> usize {
        self.values.ncols()
    }
}
