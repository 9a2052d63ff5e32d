use thiserror::Error;

/// Field mapper error types
///
/// Only conditions that abort a dataset live here. Unmatched sync rows and
/// degenerate series are handled by documented fallbacks and surface as
/// `PipelineEvent`s instead.
#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Missing column for {role}: no header contains {expected:?} (available: {available:?})")]
    MissingColumn {
        role: String,
        expected: Vec<String>,
        available: Vec<String>,
    },

    #[error("Invalid filter config: cutoff {cutoff_hz} Hz must be below Nyquist ({sample_rate_hz} Hz / 2)")]
    InvalidFilterConfig { cutoff_hz: f64, sample_rate_hz: f64 },

    #[error("No usable samples parsed from {source_name}")]
    EmptyParseResult { source_name: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for field mapper operations
pub type Result<T> = std::result::Result<T, MapperError>;
