#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Processing stages for Massachusetts town, assessor, open space, parcel
//! and crash data.
//!
//! Each stage is a pure transformation over in-memory
//! [`GeoTable`](milton_maps_table::GeoTable)s. Reading and writing files is
//! left to the caller. The stages run in this order:
//!
//! 1. [`boundaries::consolidate`] merges town survey fragments and produces
//!    the [`town_ids::TownIdMap`] hand-off artifact.
//! 2. [`assessor::normalize_assessor`] derives parcel ids and labels, using
//!    that artifact to name towns.
//! 3. [`parcels::join_residential`] joins tax parcel shapes with normalized
//!    assessor records and keeps residential parcels.
//!
//! [`open_space::normalize_open_space`] and [`crashes::ingest_crashes`] are
//! independent of the chain above.

pub mod assessor;
pub mod boundaries;
pub mod config;
pub mod crashes;
pub mod open_space;
pub mod parcels;
pub mod town_ids;

use milton_maps_table::TableError;
use serde_json::Value;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Errors that abort a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input path does not exist or cannot be read.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A multi-layer source does not contain the requested layer.
    #[error("{path} does not contain the layer {layer}")]
    LayerNotFound {
        /// Source path.
        path: String,
        /// Requested layer.
        layer: String,
    },

    /// Required columns are absent or the output schema drifted.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of what went wrong.
        message: String,
    },

    /// A data validation check failed.
    #[error("Data integrity violation: {message}")]
    DataIntegrity {
        /// Description of what went wrong.
        message: String,
    },

    /// Invalid configuration or command-line arguments.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// Reading or writing a table failed.
    #[error("Table error: {0}")]
    Table(TableError),

    /// I/O error at a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<TableError> for PipelineError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::SourceUnavailable(path) => Self::SourceUnavailable(path),
            TableError::LayerNotFound { path, layer } => Self::LayerNotFound { path, layer },
            TableError::CrsMismatch { expected, found } => Self::SchemaMismatch {
                message: format!("tables disagree on CRS: {expected} vs {found}"),
            },
            other => Self::Table(other),
        }
    }
}

/// Broad category of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ErrorKind {
    SourceUnavailable,
    SchemaMismatch,
    DataIntegrityViolation,
    Configuration,
    Io,
}

impl PipelineError {
    /// Returns the broad category of this error.
    ///
    /// A missing layer counts as a schema mismatch: the source exists but
    /// does not have the shape the stage expects.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::LayerNotFound { .. } | Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::DataIntegrity { .. } => ErrorKind::DataIntegrityViolation,
            Self::Config { .. } => ErrorKind::Configuration,
            Self::Table(_) | Self::Io { .. } | Self::Json(_) | Self::Csv(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity {
            message: message.into(),
        }
    }
}

/// Renders a scalar attribute as text the way identifiers are written.
///
/// Strings are returned as-is and integral numbers without a decimal part
/// (`189.0` becomes `"189"`). Null, booleans and nested values yield `None`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.as_i64().map_or_else(
            || {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map_or_else(|| n.to_string(), |f| format!("{f:.0}"))
            },
            |i| i.to_string(),
        )),
        _ => None,
    }
}
