// config.rs: Pipeline configuration records
//
// Every tunable constant of the batch pipelines lives here, grouped per
// component. Components receive their section at construction; nothing reads
// global state. All sections deserialize with defaults so a JSON override file
// only needs the keys it changes.

use serde::{Deserialize, Serialize};

// ─── Signal conditioning ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    /// Reading emitted by a disconnected range finder.
    pub dropout_sentinel: f64,
    /// Max allowed sample-to-sample change before a value is treated as a jump.
    pub jump_threshold: f64,
    /// Butterworth order used by `lowpass`.
    pub lowpass_order: usize,
    /// Series longer than this get the dense smoothing chain.
    pub dense_threshold: usize,
    pub dense_median_window: usize,
    pub dense_rolling_window: usize,
    pub sparse_median_window: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            dropout_sentinel: 0.0,
            jump_threshold: 25.0,
            lowpass_order: 4,
            dense_threshold: 500,
            dense_median_window: 7,
            dense_rolling_window: 5,
            sparse_median_window: 3,
        }
    }
}

// ─── Dead reckoning ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Running sum scaled by dt.
    Rectangular,
    /// Cumulative trapezoid starting at zero.
    Trapezoid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    pub lowpass_cutoff_hz: f64,
    /// |v| below this is forced to zero (ZUPT heuristic).
    pub velocity_zero_threshold: f64,
    /// Used when the sample clock cannot provide a usable dt.
    pub nominal_dt: f64,
    pub integration: IntegrationMethod,
    /// Second-order drift correction on position.
    pub detrend_position: bool,
    /// Physical length of a surveyed pass (m).
    pub known_length: f64,
    /// Final raw displacement at or below this falls back to a linear ramp.
    pub min_travel: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            lowpass_cutoff_hz: 2.0,
            velocity_zero_threshold: 0.02,
            nominal_dt: 0.002,
            integration: IntegrationMethod::Rectangular,
            detrend_position: false,
            known_length: 1.60,
            min_travel: 0.01,
        }
    }
}

// ─── Ultrasonic log parsing ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Separates the timestamp from the payload on each log line.
    pub separator: String,
    /// Banner text the rig prints at power-up.
    pub startup_marker: String,
    /// Duration assigned to the final line, which has no successor.
    pub last_line_duration_s: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            separator: "->".to_string(),
            startup_marker: "--- STARTED ---".to_string(),
            last_line_duration_s: 0.5,
        }
    }
}

// ─── Synchronization / resampling / gridding ────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Max time gap (s) for a nearest-match pair.
    pub tolerance_s: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { tolerance_s: 0.1 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub target_points: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self { target_points: 150 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub resolution_x: usize,
    pub resolution_y: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution_x: 300,
            resolution_y: 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableScanConfig {
    /// Rows with S1 at or below this (cm) are rig artifacts.
    pub s1_min: f64,
}

impl Default for TableScanConfig {
    fn default() -> Self {
        Self { s1_min: 53.0 }
    }
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conditioner: ConditionerConfig,
    pub trajectory: TrajectoryConfig,
    pub parser: ParserConfig,
    pub sync: SyncConfig,
    pub resample: ResampleConfig,
    pub grid: GridConfig,
    pub table_scan: TableScanConfig,
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &std::path::Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
