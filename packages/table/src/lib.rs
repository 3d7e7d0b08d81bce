#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory geospatial attribute tables.
//!
//! A [`GeoTable`] is a list of rows, each holding a map of named scalar
//! attributes and an optional geometry, plus a coordinate reference system
//! tag shared by the whole table. This is the unit every pipeline stage
//! consumes and produces. The file formats the tables move through live in
//! [`io`].

pub mod format;
pub mod io;

mod archive;
mod geojson_io;
mod msgpack;
mod spatial_read;

use std::collections::{BTreeMap, BTreeSet};

use geo::Geometry;
use serde_json::Value;
use thiserror::Error;

pub use format::FileFormat;

/// Named scalar attributes of one row.
pub type Attributes = BTreeMap<String, Value>;

static NULL: Value = Value::Null;

/// Errors from reading, writing, or combining tables.
#[derive(Debug, Error)]
pub enum TableError {
    /// The input path does not exist.
    #[error("Source not found: {0}")]
    SourceUnavailable(String),

    /// The requested layer is not present in a multi-layer source.
    #[error("{path} does not contain the layer {layer}")]
    LayerNotFound {
        /// Source path.
        path: String,
        /// Requested layer name.
        layer: String,
    },

    /// The path's extension does not map to a known format.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The format can be read but not written.
    #[error("Cannot write {format} files: {path}")]
    ReadOnlyFormat {
        /// Format name.
        format: FileFormat,
        /// Destination path.
        path: String,
    },

    /// Tables with different coordinate reference systems were combined.
    #[error("CRS mismatch: expected {expected}, found {found}")]
    CrsMismatch {
        /// CRS of the first table.
        expected: String,
        /// Conflicting CRS.
        found: String,
    },

    /// A stored geometry could not be decoded.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error at a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `MessagePack` encoding failed.
    #[error("MessagePack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    /// `MessagePack` decoding failed.
    #[error("MessagePack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    /// Zip archive error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// `DuckDB` error while reading a spatial source.
    #[error("DuckDB error: {0}")]
    Database(#[from] duckdb::Error),
}

/// One table row: scalar attributes plus an optional geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoRow {
    /// Attribute values keyed by column name.
    pub attributes: Attributes,
    /// Row geometry, if the source layer is spatial.
    pub geometry: Option<Geometry<f64>>,
}

impl GeoRow {
    #[must_use]
    pub const fn new(attributes: Attributes, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            attributes,
            geometry,
        }
    }

    /// Returns the value of `column`, or JSON null when absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    /// Returns the value of `column` if it is a string.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).as_str()
    }

    /// Returns the value of `column` as a float.
    ///
    /// Integers and numeric strings are converted.
    #[must_use]
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column) {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value of `column` as an integer.
    ///
    /// Floats with an integral value and numeric strings are converted;
    /// anything else is `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns `true` when `column` is absent or null.
    #[must_use]
    pub fn is_null(&self, column: &str) -> bool {
        self.get(column).is_null()
    }

    /// Sets `column` to `value`, replacing any previous value.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.attributes.insert(column.to_string(), value.into());
    }
}

/// A table of [`GeoRow`]s sharing one coordinate reference system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoTable {
    /// CRS identifier (e.g. `"EPSG:26986"`), if known.
    pub crs: Option<String>,
    /// Table rows.
    pub rows: Vec<GeoRow>,
}

impl GeoTable {
    #[must_use]
    pub const fn new(crs: Option<String>, rows: Vec<GeoRow>) -> Self {
        Self { crs, rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of the attribute columns present in any row, sorted.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|row| row.attributes.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Whether any row carries `column`.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.rows
            .iter()
            .any(|row| row.attributes.contains_key(column))
    }

    /// Whether any row has a geometry.
    #[must_use]
    pub fn has_geometry(&self) -> bool {
        self.rows.iter().any(|row| row.geometry.is_some())
    }

    /// Concatenates tables row-wise.
    ///
    /// Tables without a CRS adopt the CRS of the others.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::CrsMismatch`] if two tables carry different
    /// CRS tags.
    pub fn concat(tables: impl IntoIterator<Item = Self>) -> Result<Self, TableError> {
        let mut combined = Self::default();

        for table in tables {
            if let Some(found) = table.crs {
                if let Some(expected) = &combined.crs {
                    if *expected != found {
                        return Err(TableError::CrsMismatch {
                            expected: expected.clone(),
                            found,
                        });
                    }
                } else {
                    combined.crs = Some(found);
                }
            }
            combined.rows.extend(table.rows);
        }

        Ok(combined)
    }
}

/// Logs a short description of a table at `info` level.
pub fn log_table_summary(description: &str, table: &GeoTable) {
    log::info!(
        "{description}: {} rows, {} columns, geometry={}, crs={}",
        table.len(),
        table.columns().len(),
        table.has_geometry(),
        table.crs.as_deref().unwrap_or("unknown"),
    );
    log::debug!("{description} columns: {}", table.columns().join(", "));
}
