use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised by the feature engine before any output is produced.
///
/// Computation never fails halfway: either a complete table is returned, with
/// per-cell NaN where a window is not yet full, or one of these variants is
/// returned instead.
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("missing required column '{column}'")]
    Schema { column: String },

    #[error("price series is empty")]
    EmptySeries,

    #[error("insufficient data: {rows} rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    #[error("duplicate timestamp {0}")]
    DuplicateTimestamp(NaiveDate),

    #[error("column '{column}' has {len} values, expected {expected}")]
    LengthMismatch {
        column: String,
        len: usize,
        expected: usize,
    },

    #[error("unable to parse timestamp '{value}'")]
    UnparseableTimestamp { value: String },

    #[error("feature '{0}' was not produced by the composer")]
    MissingFeature(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl FeatureError {
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
        }
    }

    /// True for errors a batch caller should treat as "skip this instrument".
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. } | Self::EmptySeries)
    }
}

pub type FeatureResult<T> = std::result::Result<T, FeatureError>;
