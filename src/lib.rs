//! Position/field reconstruction from handheld sensor logs
//!
//! Batch pipelines that turn accelerometer, magnetometer and ultrasonic
//! range-finder recordings into located field measurements: a dead-reckoned
//! trajectory with field values, a matrix of parallel survey passes, or a
//! gridded field map.

pub mod conditioner;
pub mod config;
pub mod error;
pub mod field_grid;
pub mod filters;
pub mod physics;
pub mod pipeline;
pub mod resample;
pub mod sensors;
pub mod smoothing;
pub mod synchronization;
pub mod trajectory;
pub mod types;

pub use config::PipelineConfig;
pub use error::{MapperError, Result};
pub use pipeline::{
    DatasetRegistry, PassSurveyPipeline, PipelineEvent, PipelineRun, SurveyDefinition,
    TableScanPipeline, TrajectoryMapPipeline,
};
