pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};

/// Ordered `(timestamp, value)` samples stored as parallel columns.
///
/// Timestamps are seconds and non-decreasing once the series has been built
/// through [`TimeSeries::from_unsorted`]; interpolation code relies on that.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeSeries<T> {
    times: Vec<f64>,
    values: Vec<T>,
}

impl<T> TimeSeries<T> {
    /// Build from already-ordered columns.
    pub fn new(times: Vec<f64>, values: Vec<T>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(MapperError::InvalidInput(format!(
                "time column has {} entries but value column has {}",
                times.len(),
                values.len()
            )));
        }
        if !is_monotonic(&times) {
            return Err(MapperError::InvalidInput(
                "timestamps must be non-decreasing".to_string(),
            ));
        }
        Ok(Self { times, values })
    }

    /// Build from `(t, value)` pairs in any order; sorting is stable so equal
    /// timestamps keep their original relative order.
    pub fn from_unsorted(mut samples: Vec<(f64, T)>) -> Self {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, values) = samples.into_iter().unzip();
        Self { times, values }
    }

    pub fn empty() -> Self {
        Self {
            times: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.times.iter().copied().zip(self.values.iter())
    }

    /// New series on the same clock with every value transformed.
    pub fn map_values<U>(&self, f: impl FnMut(&T) -> U) -> TimeSeries<U> {
        TimeSeries {
            times: self.times.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Replace the value column, keeping the clock. Lengths must match.
    pub fn with_values<U>(&self, values: Vec<U>) -> Result<TimeSeries<U>> {
        TimeSeries::new(self.times.clone(), values)
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<T>) {
        (self.times, self.values)
    }
}

pub fn is_monotonic(times: &[f64]) -> bool {
    times.windows(2).all(|w| w[0] <= w[1])
}

// ===== Sensor readings =====

/// Planar linear acceleration (m/s²).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelReading {
    pub x: f64,
    pub y: f64,
}

/// Magnetic field vector (µT).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MagReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MagReading {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Dual range-finder distances (cm).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    pub s1: f64,
    pub s2: f64,
}

pub type AccelSeries = TimeSeries<AccelReading>;
pub type MagSeries = TimeSeries<MagReading>;
pub type RangeSeries = TimeSeries<RangeReading>;
pub type ScalarSeries = TimeSeries<f64>;

/// Scalar field intensity from a vector magnetometer stream.
pub fn field_magnitude(mag: &MagSeries) -> ScalarSeries {
    mag.map_values(MagReading::magnitude)
}

// ===== Spatial products =====

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

/// Planar position trace, one point per accelerometer sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn from_columns(times: &[f64], xs: &[f64], ys: &[f64]) -> Result<Self> {
        if times.len() != xs.len() || times.len() != ys.len() {
            return Err(MapperError::InvalidInput(format!(
                "trajectory columns differ in length: t={}, x={}, y={}",
                times.len(),
                xs.len(),
                ys.len()
            )));
        }
        let points = times
            .iter()
            .zip(xs.iter().zip(ys.iter()))
            .map(|(&t, (&x, &y))| TrajectoryPoint { t, x, y })
            .collect();
        Ok(Self { points })
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.t).collect()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    /// Positions as a series on the trajectory clock, for time joins.
    pub fn as_series(&self) -> TimeSeries<(f64, f64)> {
        TimeSeries {
            times: self.times(),
            values: self.points.iter().map(|p| (p.x, p.y)).collect(),
        }
    }
}

/// Field value located in the plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

/// One traversal of the sensing path at a fixed lateral offset.
#[derive(Clone, Debug, Serialize)]
pub struct Pass {
    pub start_x: f64,
    pub trajectory: Trajectory,
    /// Field value per trajectory point, same length as `trajectory`.
    pub field: Vec<f64>,
}

impl Pass {
    pub fn field_samples(&self) -> Vec<FieldSample> {
        self.trajectory
            .points()
            .iter()
            .zip(self.field.iter())
            .map(|(p, &value)| FieldSample {
                x: p.x,
                y: p.y,
                value,
            })
            .collect()
    }
}

/// A pass resampled onto a fixed number of evenly-indexed points.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResampledPass {
    pub start_x: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub values: Vec<f64>,
}

impl ResampledPass {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unsorted_orders_by_time() {
        let series = TimeSeries::from_unsorted(vec![(2.0, 'c'), (0.0, 'a'), (1.0, 'b')]);
        assert_eq!(series.times(), &[0.0, 1.0, 2.0]);
        assert_eq!(series.values(), &['a', 'b', 'c']);
    }

    #[test]
    fn test_new_rejects_non_monotonic() {
        assert!(TimeSeries::new(vec![0.0, 2.0, 1.0], vec![1, 2, 3]).is_err());
        assert!(TimeSeries::new(vec![0.0, 1.0], vec![1]).is_err());
        assert!(TimeSeries::new(vec![0.0, 0.0, 1.0], vec![1, 2, 3]).is_ok());
    }

    #[test]
    fn test_mag_magnitude() {
        let m = MagReading { x: 3.0, y: 4.0, z: 12.0 };
        assert!((m.magnitude() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_trajectory_column_mismatch() {
        assert!(Trajectory::from_columns(&[0.0, 1.0], &[0.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_pass_field_samples() {
        let trajectory = Trajectory::from_columns(&[0.0, 1.0], &[0.2, 0.2], &[0.0, 0.5]).unwrap();
        let pass = Pass {
            start_x: 0.2,
            trajectory,
            field: vec![40.0, 41.0],
        };
        let samples = pass.field_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1], FieldSample { x: 0.2, y: 0.5, value: 41.0 });
    }
}
