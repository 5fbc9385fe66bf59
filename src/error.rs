//! Error types for the cleaning pipeline.
//!
//! Only malformed input and configuration surface as errors. Per-row anomalies
//! are handled inside the detectors and never abort a run.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required column is absent from an input table.
    #[error("missing required column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    /// A cell that should hold a number holds something else.
    #[error("{table} row {row}, column '{column}': '{value}' is not a number")]
    NonNumeric {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    /// A lookup or event table is not sorted by its key.
    #[error("{table} is not monotonic at row {row}")]
    NonMonotonicTable { table: String, row: usize },

    /// An interval whose start lies after its end, or with a non-finite bound.
    #[error("{table} row {row}: invalid interval [{start}, {end}]")]
    InvalidInterval {
        table: String,
        row: usize,
        start: f64,
        end: f64,
    },

    /// A table whose overall shape is wrong, e.g. JSON that is not a list of
    /// records.
    #[error("{table}: {reason}")]
    MalformedTable { table: String, reason: String },

    /// A configuration value outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The measurement series has no rows.
    #[error("measurement series is empty")]
    EmptySeries,

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl Error {
    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        Error::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn non_numeric(table: &str, row: usize, column: &str, value: &str) -> Self {
        Error::NonNumeric {
            table: table.to_string(),
            row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn non_monotonic(table: &str, row: usize) -> Self {
        Error::NonMonotonicTable {
            table: table.to_string(),
            row,
        }
    }
}
