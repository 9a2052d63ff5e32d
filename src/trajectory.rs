// trajectory.rs: Planar dead reckoning from linear acceleration
//
// Standard chain per axis:
//   low-pass -> integrate -> endpoint detrend -> ZUPT -> integrate [-> detrend]
//
// Forced-length chain (single axis, for surveyed passes of known length):
//   trapezoid -> least-squares detrend -> trapezoid -> rescale to known length

use serde::Serialize;

use crate::config::{ConditionerConfig, IntegrationMethod, TrajectoryConfig};
use crate::conditioner::SignalConditioner;
use crate::error::Result;
use crate::physics;
use crate::types::{AccelSeries, ScalarSeries, Trajectory};

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// Sample period actually used for integration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SamplePeriod {
    pub dt: f64,
    /// `true` when the clock was unusable and the nominal dt was substituted.
    pub fallback: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrajectoryEstimate {
    pub trajectory: Trajectory,
    /// Low-passed acceleration, one `(ax, ay)` per sample.
    pub filtered_accel: Vec<(f64, f64)>,
    /// Drift-corrected velocity after ZUPT, one `(vx, vy)` per sample.
    pub velocities: Vec<(f64, f64)>,
    pub period: SamplePeriod,
}

/// How the forced-length correction was applied.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForcedScale {
    /// Raw positions multiplied by `factor`. `flipped` means the raw trace
    /// ended on the opposite side of the origin from the known length.
    Scaled { factor: f64, flipped: bool },
    /// Raw travel too small to trust; positions are a ramp from 0 to the
    /// known length.
    LinearRamp,
}

#[derive(Clone, Debug, Serialize)]
pub struct ForcedTrajectory {
    /// One-dimensional: x is always zero.
    pub trajectory: Trajectory,
    /// Final raw displacement before correction.
    pub raw_final: f64,
    pub scale: ForcedScale,
    pub period: SamplePeriod,
}

// ─── Estimator ───────────────────────────────────────────────────────────────

pub struct TrajectoryEstimator {
    config: TrajectoryConfig,
    conditioner: SignalConditioner,
}

impl TrajectoryEstimator {
    pub fn new(config: TrajectoryConfig, conditioner: ConditionerConfig) -> Self {
        Self {
            config,
            conditioner: SignalConditioner::new(conditioner),
        }
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    /// Mean timestep of `times`, or the nominal dt when it cannot be computed.
    pub fn sample_period(&self, times: &[f64]) -> SamplePeriod {
        match physics::mean_dt(times) {
            Some(dt) => SamplePeriod { dt, fallback: false },
            None => {
                log::warn!(
                    "Cannot derive dt from {} timestamps, using nominal {} s",
                    times.len(),
                    self.config.nominal_dt
                );
                SamplePeriod {
                    dt: self.config.nominal_dt,
                    fallback: true,
                }
            }
        }
    }

    /// Two-axis dead reckoning.
    ///
    /// Fails only when the low-pass cutoff is not below the Nyquist frequency
    /// of the derived sample rate.
    pub fn estimate(&self, accel: &AccelSeries) -> Result<TrajectoryEstimate> {
        let period = self.sample_period(accel.times());
        let fs = 1.0 / period.dt;

        let ax: Vec<f64> = accel.values().iter().map(|a| a.x).collect();
        let ay: Vec<f64> = accel.values().iter().map(|a| a.y).collect();

        let ax = self.conditioner.lowpass(&ax, self.config.lowpass_cutoff_hz, fs)?;
        let ay = self.conditioner.lowpass(&ay, self.config.lowpass_cutoff_hz, fs)?;

        let vx = self.velocity(&ax, period.dt);
        let vy = self.velocity(&ay, period.dt);

        let px = self.position(&vx, period.dt);
        let py = self.position(&vy, period.dt);

        let trajectory = Trajectory::from_columns(accel.times(), &px, &py)?;
        if let Some(end) = trajectory.last() {
            log::info!(
                "Trajectory: {} points, dt={:.5}s, end=({:.3}, {:.3})",
                trajectory.len(),
                period.dt,
                end.x,
                end.y
            );
        }

        Ok(TrajectoryEstimate {
            trajectory,
            filtered_accel: ax.into_iter().zip(ay).collect(),
            velocities: vx.into_iter().zip(vy).collect(),
            period,
        })
    }

    fn velocity(&self, accel: &[f64], dt: f64) -> Vec<f64> {
        let v = physics::integrate(accel, dt, self.config.integration);
        let v = physics::detrend_endpoints(&v);
        physics::zero_small(&v, self.config.velocity_zero_threshold)
    }

    fn position(&self, velocity: &[f64], dt: f64) -> Vec<f64> {
        let p = physics::integrate(velocity, dt, self.config.integration);
        if self.config.detrend_position {
            physics::detrend_endpoints(&p)
        } else {
            p
        }
    }

    /// Single-axis reconstruction forced onto `known_length`.
    pub fn estimate_forced_y(&self, accel_y: &ScalarSeries) -> Result<ForcedTrajectory> {
        let period = self.sample_period(accel_y.times());

        let v = physics::integrate(accel_y.values(), period.dt, IntegrationMethod::Trapezoid);
        let v = physics::detrend_least_squares(&v);
        let raw = physics::integrate(&v, period.dt, IntegrationMethod::Trapezoid);
        let raw_final = raw.last().copied().unwrap_or(0.0);

        let (y, scale) = apply_forced_length(&raw, self.config.known_length, self.config.min_travel);
        match scale {
            ForcedScale::Scaled { factor, flipped } => log::debug!(
                "Forced length: raw end {raw_final:.4} m, scale {factor:.4}, flipped={flipped}"
            ),
            ForcedScale::LinearRamp => log::warn!(
                "Forced length: raw travel {raw_final:.4} m below {} m, using linear ramp",
                self.config.min_travel
            ),
        }

        let xs = vec![0.0; y.len()];
        let trajectory = Trajectory::from_columns(accel_y.times(), &xs, &y)?;
        Ok(ForcedTrajectory {
            trajectory,
            raw_final,
            scale,
            period,
        })
    }
}

impl Default for TrajectoryEstimator {
    fn default() -> Self {
        Self::new(TrajectoryConfig::default(), ConditionerConfig::default())
    }
}

/// Rescale `raw` so it ends exactly at `known_length`.
///
/// When `|raw_final| <= min_travel` the trace is replaced by an evenly spaced
/// ramp from 0 to `known_length`.
pub fn apply_forced_length(raw: &[f64], known_length: f64, min_travel: f64) -> (Vec<f64>, ForcedScale) {
    let raw_final = raw.last().copied().unwrap_or(0.0);
    if raw_final.abs() > min_travel {
        let factor = known_length / raw_final;
        let flipped = raw_final.signum() != known_length.signum();
        (raw.iter().map(|p| p * factor).collect(), ForcedScale::Scaled { factor, flipped })
    } else {
        (physics::linspace(0.0, known_length, raw.len()), ForcedScale::LinearRamp)
    }
}
