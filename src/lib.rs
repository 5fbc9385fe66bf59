//! Outlier and contamination removal for ice-core continuous flow analysis
//! (CFA) particle data.
//!
//! A run loads a depth-ordered [`MeasurementSeries`], resolves the core-break,
//! volcanic and dust intervals into an [`IntervalIndex`], then lets a fixed
//! sequence of detectors propose removals. The [`Reconciler`] is the only
//! code that blanks rows; it keeps an [`AuditLedger`] of every match so the
//! [`CleaningReport`] can give per-detector counts net of overlap.
//!
//! ```no_run
//! use std::path::Path;
//! use cfa_clean::{Pipeline, PipelineConfig};
//! use cfa_clean::data::loader;
//!
//! let series = loader::load_measurements(Path::new("cfa.parquet"))?;
//! let outcome = Pipeline::new(PipelineConfig::default())?.run(series, None, None)?;
//! println!("{}", outcome.report);
//! # Ok::<(), cfa_clean::Error>(())
//! ```

pub mod config;
pub mod data;
pub mod detect;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod stats;

pub use config::{ManualInterval, PipelineConfig, VolcanicBuffer, VolcanicOutliers};
pub use data::intervals::{AgeModel, DustEvent, EventTables, IntervalIndex, VolcanicEvent};
pub use data::model::{Flags, Measurement, MeasurementSeries, MissingBins, SizeBin, SizeBins};
pub use error::{Error, Result};
pub use pipeline::{CleaningOutcome, Pipeline};
pub use reconcile::{AuditLedger, Detection, Reconciler, RemovalReason, RemovedRow, Shield};
pub use report::{CleaningReport, SummaryStatistics};
