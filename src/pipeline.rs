// pipeline.rs: Batch pipelines composed from the core stages
//
// TrajectoryMapPipeline  accel (+ mag) table  -> trajectory with field values
// PassSurveyPipeline     survey definition    -> pass matrix + field samples
// TableScanPipeline      ultrasonic log + field table -> field grid
//
// Every fallback taken along the way is returned as a PipelineEvent next to the
// result, in addition to being logged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::conditioner::SignalConditioner;
use crate::error::{MapperError, Result};
use crate::field_grid::{FieldGrid, FieldGridInterpolator, GridReport};
use crate::resample::{PassMatrix, PathResampler};
use crate::sensors::{ColumnRole, TableLoader, TableSchema, UltrasonicLogParser};
use crate::smoothing::SmoothingMode;
use crate::synchronization::{drop_undefined, Extrapolation, MultiStreamSynchronizer};
use crate::trajectory::{ForcedScale, SamplePeriod, TrajectoryEstimator};
use crate::types::{
    field_magnitude, AccelSeries, FieldSample, MagReading, MagSeries, Pass, RangeSeries, ResampledPass,
    ScalarSeries, TimeSeries, Trajectory,
};

// ─── Diagnostics ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    DtFallback { stage: String, nominal_dt: f64 },
    ForcedLengthScaled { pass: usize, factor: f64, flipped: bool },
    ForcedLengthRamp { pass: usize, raw_final: f64 },
    RowsUnmatched { stage: String, count: usize },
    RowsDropped { stage: String, count: usize },
    SparseSmoothing { n_points: usize },
    ResamplePassThrough { pass: usize, len: usize },
    MagnetometerMissing { reason: String },
    PassSkipped { pass: usize, reason: String },
    ArtifactRowsFiltered { count: usize, threshold: f64 },
    LinesSkipped { count: usize },
    DuplicatePointsIgnored { count: usize },
    NonFiniteSamplesIgnored { count: usize },
    DegenerateTriangulation { samples: usize },
}

/// Pipeline output together with the fallbacks it needed.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineRun<T> {
    pub output: T,
    pub events: Vec<PipelineEvent>,
}

fn push_period(events: &mut Vec<PipelineEvent>, stage: &str, period: SamplePeriod) {
    if period.fallback {
        events.push(PipelineEvent::DtFallback {
            stage: stage.to_string(),
            nominal_dt: period.dt,
        });
    }
}

fn push_grid_report(events: &mut Vec<PipelineEvent>, report: &GridReport) {
    if report.duplicates_ignored > 0 {
        events.push(PipelineEvent::DuplicatePointsIgnored {
            count: report.duplicates_ignored,
        });
    }
    if report.non_finite_ignored > 0 {
        events.push(PipelineEvent::NonFiniteSamplesIgnored {
            count: report.non_finite_ignored,
        });
    }
    if report.degenerate {
        events.push(PipelineEvent::DegenerateTriangulation {
            samples: report.samples,
        });
    }
}

// ─── Trajectory map ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct TrajectoryMap {
    pub trajectory: Trajectory,
    /// Field magnitude per trajectory point; `None` without a magnetometer.
    pub field: Option<Vec<f64>>,
    pub filtered_accel: Vec<(f64, f64)>,
    pub velocities: Vec<(f64, f64)>,
    pub dt: f64,
}

impl TrajectoryMap {
    pub fn field_samples(&self) -> Vec<FieldSample> {
        let Some(field) = &self.field else {
            return Vec::new();
        };
        self.trajectory
            .points()
            .iter()
            .zip(field)
            .map(|(p, &value)| FieldSample { x: p.x, y: p.y, value })
            .collect()
    }
}

pub struct TrajectoryMapPipeline {
    config: PipelineConfig,
    loader: TableLoader,
}

impl TrajectoryMapPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            loader: TableLoader::default(),
        }
    }

    /// Load the exports and run. A magnetometer file that is absent or fails
    /// to load only removes the field values.
    pub fn run(&self, accel_path: &Path, mag_path: Option<&Path>) -> Result<PipelineRun<TrajectoryMap>> {
        let accel = self
            .loader
            .load_path(accel_path, &TableSchema::linear_acceleration())?
            .accel_series()?;

        let mut events = Vec::new();
        let mag = match mag_path {
            None => {
                events.push(PipelineEvent::MagnetometerMissing {
                    reason: "no magnetometer file given".to_string(),
                });
                None
            }
            Some(path) => match self
                .loader
                .load_path(path, &TableSchema::magnetometer())
                .and_then(|t| t.mag_series())
            {
                Ok(mag) => Some(mag),
                Err(e) => {
                    log::warn!("magnetometer unavailable: {e}");
                    events.push(PipelineEvent::MagnetometerMissing {
                        reason: e.to_string(),
                    });
                    None
                }
            },
        };

        let mut run = self.run_series(&accel, mag.as_ref())?;
        events.append(&mut run.events);
        run.events = events;
        Ok(run)
    }

    pub fn run_series(&self, accel: &AccelSeries, mag: Option<&MagSeries>) -> Result<PipelineRun<TrajectoryMap>> {
        let mut events = Vec::new();
        let estimator = TrajectoryEstimator::new(self.config.trajectory.clone(), self.config.conditioner.clone());
        let estimate = estimator.estimate(accel)?;
        push_period(&mut events, "trajectory", estimate.period);

        let field = match mag {
            Some(mag) => {
                let sync = MultiStreamSynchronizer::new(self.config.sync.clone());
                let field = magnitude_on_clock(&sync, mag, accel.times())?;
                if field.is_none() {
                    events.push(PipelineEvent::MagnetometerMissing {
                        reason: "magnetometer series is empty".to_string(),
                    });
                }
                field
            }
            None => None,
        };

        Ok(PipelineRun {
            output: TrajectoryMap {
                trajectory: estimate.trajectory,
                field,
                filtered_accel: estimate.filtered_accel,
                velocities: estimate.velocities,
                dt: estimate.period.dt,
            },
            events,
        })
    }
}

/// Field magnitude at `times`, from each magnetometer axis interpolated
/// separately with end values held. `None` when `mag` is empty.
fn magnitude_on_clock(sync: &MultiStreamSynchronizer, mag: &MagSeries, times: &[f64]) -> Result<Option<Vec<f64>>> {
    let axis = |f: fn(&MagReading) -> f64| sync.interpolate_onto(&mag.map_values(f), times, Extrapolation::Clamp);
    let (xs, ys, zs) = (axis(|m| m.x)?, axis(|m| m.y)?, axis(|m| m.z)?);
    Ok(xs
        .values()
        .iter()
        .zip(ys.values())
        .zip(zs.values())
        .map(|((&x, &y), &z)| Some(MagReading { x: x?, y: y?, z: z? }.magnitude()))
        .collect())
}

// ─── Pass survey ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassDefinition {
    pub accel_file: PathBuf,
    pub mag_file: PathBuf,
    /// Lateral offset of this pass (m).
    pub start_x: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyDefinition {
    pub passes: Vec<PassDefinition>,
}

impl SurveyDefinition {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a definition; relative file paths are taken relative to the
    /// definition file's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut survey = Self::from_json(&std::fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            for pass in &mut survey.passes {
                pass.accel_file = base.join(&pass.accel_file);
                pass.mag_file = base.join(&pass.mag_file);
            }
        }
        Ok(survey)
    }
}

/// One pass already loaded into memory.
#[derive(Clone, Debug)]
pub struct PassInput {
    pub start_x: f64,
    pub accel_y: ScalarSeries,
    pub mag: MagSeries,
}

#[derive(Clone, Debug, Serialize)]
pub struct SurveyResult {
    pub matrix: PassMatrix,
    /// Every joined sample in global coordinates, before resampling.
    pub samples: Vec<FieldSample>,
    pub passes: Vec<Pass>,
}

pub struct PassSurveyPipeline {
    config: PipelineConfig,
    loader: TableLoader,
}

impl PassSurveyPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            loader: TableLoader::default(),
        }
    }

    fn load_pass(&self, def: &PassDefinition) -> Result<PassInput> {
        let accel = self.loader.load_path(&def.accel_file, &TableSchema::acceleration())?;
        let mag = self.loader.load_path(&def.mag_file, &TableSchema::magnetometer())?;
        Ok(PassInput {
            start_x: def.start_x,
            accel_y: accel.scalar_series(ColumnRole::AccelY)?,
            mag: mag.mag_series()?,
        })
    }

    /// Load and process every pass. Passes that fail to load are skipped.
    pub fn run(&self, survey: &SurveyDefinition) -> Result<PipelineRun<SurveyResult>> {
        let mut events = Vec::new();
        let mut inputs = Vec::new();
        for (i, def) in survey.passes.iter().enumerate() {
            match self.load_pass(def) {
                Ok(input) => inputs.push((i, input)),
                Err(e) => {
                    log::warn!("pass {}: skipped ({e})", i + 1);
                    events.push(PipelineEvent::PassSkipped {
                        pass: i,
                        reason: e.to_string(),
                    });
                }
            }
        }
        let mut run = self.process(&inputs)?;
        events.append(&mut run.events);
        run.events = events;
        Ok(run)
    }

    pub fn run_inputs(&self, inputs: &[PassInput]) -> Result<PipelineRun<SurveyResult>> {
        let indexed: Vec<(usize, PassInput)> = inputs.iter().cloned().enumerate().collect();
        self.process(&indexed)
    }

    fn process(&self, inputs: &[(usize, PassInput)]) -> Result<PipelineRun<SurveyResult>> {
        let estimator = TrajectoryEstimator::new(self.config.trajectory.clone(), self.config.conditioner.clone());
        let sync = MultiStreamSynchronizer::new(self.config.sync.clone());
        let resampler = PathResampler::new(self.config.resample.clone());

        let mut events = Vec::new();
        let mut rows: Vec<ResampledPass> = Vec::new();
        let mut passes = Vec::new();

        for (i, input) in inputs {
            let i = *i;
            let Some(pass) = self.process_pass(i, input, &estimator, &sync, &mut events)? else {
                continue;
            };

            let (row, passed_through) =
                resampler.resample_pass(pass.start_x, &pass.trajectory.xs(), &pass.trajectory.ys(), &pass.field);
            if passed_through {
                events.push(PipelineEvent::ResamplePassThrough {
                    pass: i,
                    len: row.len(),
                });
            } else {
                log::info!("pass {}: {} -> {} points", i + 1, pass.field.len(), row.len());
                rows.push(row);
            }
            passes.push(pass);
        }

        if rows.is_empty() {
            return Err(MapperError::InvalidInput(
                "survey produced no usable passes".to_string(),
            ));
        }

        let matrix = PassMatrix::from_rows(&rows, self.config.trajectory.known_length)?;
        let samples = passes.iter().flat_map(Pass::field_samples).collect();
        Ok(PipelineRun {
            output: SurveyResult {
                matrix,
                samples,
                passes,
            },
            events,
        })
    }

    fn process_pass(
        &self,
        i: usize,
        input: &PassInput,
        estimator: &TrajectoryEstimator,
        sync: &MultiStreamSynchronizer,
        events: &mut Vec<PipelineEvent>,
    ) -> Result<Option<Pass>> {
        let forced = match estimator.estimate_forced_y(&input.accel_y) {
            Ok(forced) => forced,
            Err(e) => {
                events.push(PipelineEvent::PassSkipped {
                    pass: i,
                    reason: e.to_string(),
                });
                return Ok(None);
            }
        };
        push_period(events, &format!("pass {}", i + 1), forced.period);
        events.push(match forced.scale {
            ForcedScale::Scaled { factor, flipped } => PipelineEvent::ForcedLengthScaled {
                pass: i,
                factor,
                flipped,
            },
            ForcedScale::LinearRamp => PipelineEvent::ForcedLengthRamp {
                pass: i,
                raw_final: forced.raw_final,
            },
        });

        let magnitude = field_magnitude(&input.mag);
        let (joined, stats) = sync.nearest_join(&magnitude, &forced.trajectory.as_series());
        if stats.unmatched > 0 {
            events.push(PipelineEvent::RowsUnmatched {
                stage: format!("pass {}", i + 1),
                count: stats.unmatched,
            });
        }
        if joined.is_empty() {
            log::warn!("pass {}: empty after join", i + 1);
            events.push(PipelineEvent::PassSkipped {
                pass: i,
                reason: "no magnetometer sample within tolerance of the trajectory".to_string(),
            });
            return Ok(None);
        }

        let times = joined.times();
        let ys: Vec<f64> = joined.values().iter().map(|(_, (_, y))| *y).collect();
        let xs = vec![input.start_x; ys.len()];
        let field = joined.values().iter().map(|(b, _)| *b).collect();
        Ok(Some(Pass {
            start_x: input.start_x,
            trajectory: Trajectory::from_columns(times, &xs, &ys)?,
            field,
        }))
    }
}

// ─── Table scan ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    pub ultrasonic_log: PathBuf,
    pub field_csv: PathBuf,
    pub display_name: String,
}

impl DatasetEntry {
    fn new(id: &str, stem: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            ultrasonic_log: PathBuf::from(format!("{stem}.txt")),
            field_csv: PathBuf::from(format!("{stem}.csv")),
            display_name: display_name.to_string(),
        }
    }
}

/// Known table-scan recordings, in menu order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRegistry {
    pub datasets: Vec<DatasetEntry>,
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self {
            datasets: vec![
                DatasetEntry::new("1", "table1", "Table 1"),
                DatasetEntry::new("2", "table2", "Table 2"),
                DatasetEntry::new("3", "table3", "Table 3 (Standard)"),
                DatasetEntry::new("4", "30s_table3", "Table 3 (30s Scan)"),
                DatasetEntry::new("5", "10s_table3", "Table 3 (10s Scan)"),
            ],
        }
    }
}

impl DatasetRegistry {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, id: &str) -> Option<&DatasetEntry> {
        self.datasets.iter().find(|d| d.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.id.as_str()).collect()
    }

    /// Resolve relative file names against `dir`.
    pub fn with_base_dir(mut self, dir: &Path) -> Self {
        for entry in &mut self.datasets {
            entry.ultrasonic_log = dir.join(&entry.ultrasonic_log);
            entry.field_csv = dir.join(&entry.field_csv);
        }
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TableScanResult {
    pub display_name: String,
    pub samples: Vec<FieldSample>,
    pub grid: FieldGrid,
    pub grid_report: GridReport,
}

pub struct TableScanPipeline {
    config: PipelineConfig,
    parser: UltrasonicLogParser,
    loader: TableLoader,
}

impl TableScanPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            parser: UltrasonicLogParser::new(config.parser.clone()),
            config,
            loader: TableLoader::default(),
        }
    }

    pub fn run(&self, entry: &DatasetEntry) -> Result<PipelineRun<TableScanResult>> {
        log::info!("--- Processing {} ---", entry.display_name);
        let report = self.parser.parse_path(&entry.ultrasonic_log)?;
        if report.is_empty() {
            return Err(MapperError::EmptyParseResult {
                source_name: entry.ultrasonic_log.display().to_string(),
            });
        }
        let field = self
            .loader
            .load_path(&entry.field_csv, &TableSchema::absolute_field())?
            .scalar_series(ColumnRole::FieldMagnitude)?;

        let mut run = self.run_series(&entry.display_name, &report.series, &field)?;
        if report.lines_skipped > 0 {
            run.events.insert(
                0,
                PipelineEvent::LinesSkipped {
                    count: report.lines_skipped,
                },
            );
        }
        Ok(run)
    }

    pub fn run_series(
        &self,
        display_name: &str,
        ranges: &RangeSeries,
        field: &ScalarSeries,
    ) -> Result<PipelineRun<TableScanResult>> {
        let mut events = Vec::new();
        let conditioner = SignalConditioner::new(self.config.conditioner.clone());
        let cfg = conditioner.config();

        let s1: Vec<f64> = ranges.values().iter().map(|r| r.s1).collect();
        let s2: Vec<f64> = ranges.values().iter().map(|r| r.s2).collect();

        let s1 = conditioner.repair_dropouts(&s1, cfg.dropout_sentinel);
        let s1 = conditioner.reject_jumps(&s1, cfg.jump_threshold);
        let s2 = conditioner.reject_jumps(&s2, cfg.jump_threshold);

        let n_points = ranges.len();
        let (s1, mode) = conditioner.adaptive_smooth(&s1, n_points);
        let (s2, _) = conditioner.adaptive_smooth(&s2, n_points);
        if mode == SmoothingMode::Sparse {
            events.push(PipelineEvent::SparseSmoothing { n_points });
        }

        let sync = MultiStreamSynchronizer::new(self.config.sync.clone());
        let s1 = sync.interpolate_onto(&ranges.with_values(s1)?, field.times(), Extrapolation::Undefined)?;
        let s2 = sync.interpolate_onto(&ranges.with_values(s2)?, field.times(), Extrapolation::Undefined)?;

        let rows: Vec<Option<FieldSample>> = field
            .values()
            .iter()
            .zip(s1.values().iter().zip(s2.values()))
            .map(|(&value, (x, y))| Some(FieldSample { x: (*x)?, y: (*y)?, value }))
            .collect();
        let (merged, dropped) = drop_undefined(&TimeSeries::new(field.times().to_vec(), rows)?);
        if dropped > 0 {
            events.push(PipelineEvent::RowsDropped {
                stage: "ultrasonic/field sync".to_string(),
                count: dropped,
            });
        }

        let threshold = self.config.table_scan.s1_min;
        let (samples, artifacts): (Vec<FieldSample>, Vec<FieldSample>) =
            merged.values().iter().copied().partition(|s| s.x > threshold);
        if !artifacts.is_empty() {
            log::info!("{} rows with S1 <= {threshold} discarded", artifacts.len());
            events.push(PipelineEvent::ArtifactRowsFiltered {
                count: artifacts.len(),
                threshold,
            });
        }
        log::info!("Generated {} valid points", samples.len());

        let (grid, grid_report) = FieldGridInterpolator::new(self.config.grid.clone()).interpolate(&samples);
        push_grid_report(&mut events, &grid_report);

        Ok(PipelineRun {
            output: TableScanResult {
                display_name: display_name.to_string(),
                samples,
                grid,
                grid_report,
            },
            events,
        })
    }
}
