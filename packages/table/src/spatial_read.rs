//! Shapefile and file-geodatabase reading through the `DuckDB` `spatial`
//! extension.
//!
//! `ST_Read` wraps GDAL, so any vector layer GDAL understands can be loaded.
//! Geometries come back as `GeoJSON` text via `ST_AsGeoJSON`, the same
//! representation the rest of the workspace stores. Non-spatial layers (the
//! assessor table inside a parcel geodatabase, for example) are read as
//! attribute-only rows.

use std::path::Path;

use chrono::DateTime;
use duckdb::Connection;
use duckdb::types::TimeUnit;
use serde_json::Value;

use crate::{Attributes, GeoRow, GeoTable, TableError, geojson_io};

const GEOMETRY_ALIAS: &str = "__geometry_geojson";

/// Reads `layer` (or the default layer) of a GDAL-readable source.
///
/// The returned table is tagged with `crs`, since `ST_Read` does not
/// surface the layer's spatial reference.
pub fn read(path: &Path, layer: Option<&str>, crs: Option<&str>) -> Result<GeoTable, TableError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("INSTALL spatial; LOAD spatial;")?;

    let path_literal = quote_literal(&path.to_string_lossy());

    let source = if let Some(layer) = layer {
        let layers = list_layers(&conn, &path_literal)?;
        if !layers.iter().any(|l| l == layer) {
            log::debug!("{} layers: {}", path.display(), layers.join(", "));
            return Err(TableError::LayerNotFound {
                path: path.display().to_string(),
                layer: layer.to_string(),
            });
        }
        format!(
            "ST_Read({path_literal}, layer := {})",
            quote_literal(layer)
        )
    } else {
        format!("ST_Read({path_literal})")
    };

    let columns = describe(&conn, &source)?;
    let geometry_column = columns
        .iter()
        .find(|(_, column_type)| column_type.to_ascii_uppercase().starts_with("GEOMETRY"))
        .map(|(name, _)| name.clone());

    let attribute_columns: Vec<&str> = columns
        .iter()
        .filter(|(name, _)| Some(name) != geometry_column.as_ref())
        .map(|(name, _)| name.as_str())
        .collect();

    let mut select_list: Vec<String> = attribute_columns
        .iter()
        .map(|name| quote_identifier(name))
        .collect();
    if let Some(geometry_column) = &geometry_column {
        select_list.push(format!(
            "ST_AsGeoJSON({}) AS {GEOMETRY_ALIAS}",
            quote_identifier(geometry_column)
        ));
    }

    let query = format!("SELECT {} FROM {source}", select_list.join(", "));
    log::debug!("Reading spatial source: {query}");

    let mut stmt = conn.prepare(&query)?;
    let mut rows = stmt.query([])?;
    let mut table_rows = Vec::new();

    while let Some(row) = rows.next()? {
        let mut attributes = Attributes::new();
        for (i, name) in attribute_columns.iter().enumerate() {
            let value: duckdb::types::Value = row.get(i)?;
            attributes.insert((*name).to_string(), to_json(value));
        }

        let geometry = if geometry_column.is_some() {
            let geojson: Option<String> = row.get(attribute_columns.len())?;
            geojson
                .as_deref()
                .map(geojson_io::parse_geometry)
                .transpose()?
        } else {
            None
        };

        table_rows.push(GeoRow::new(attributes, geometry));
    }

    log::info!(
        "Read {} rows from {}{}",
        table_rows.len(),
        path.display(),
        layer.map_or_else(String::new, |l| format!(" (layer {l})"))
    );

    Ok(GeoTable::new(crs.map(ToString::to_string), table_rows))
}

fn list_layers(conn: &Connection, path_literal: &str) -> Result<Vec<String>, TableError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT l.name FROM (SELECT unnest(layers) AS l FROM ST_Read_Meta({path_literal}))"
    ))?;
    let mut rows = stmt.query([])?;
    let mut layers = Vec::new();

    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        layers.push(name);
    }

    Ok(layers)
}

/// Returns `(column_name, column_type)` pairs for a table expression.
fn describe(conn: &Connection, source: &str) -> Result<Vec<(String, String)>, TableError> {
    let mut stmt = conn.prepare(&format!("DESCRIBE SELECT * FROM {source}"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();

    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let column_type: String = row.get(1)?;
        columns.push((name, column_type));
    }

    Ok(columns)
}

/// Converts a `DuckDB` value into a JSON scalar.
///
/// Dates and timestamps become ISO text and decimals become numbers. Other
/// types without a natural JSON scalar (blobs, intervals, nested values) are
/// rendered as their debug text.
fn to_json(value: duckdb::types::Value) -> Value {
    use duckdb::types::Value as Db;

    match value {
        Db::Null => Value::Null,
        Db::Boolean(b) => Value::from(b),
        Db::TinyInt(n) => Value::from(n),
        Db::SmallInt(n) => Value::from(n),
        Db::Int(n) => Value::from(n),
        Db::BigInt(n) => Value::from(n),
        Db::HugeInt(n) => i64::try_from(n).map_or_else(|_| Value::from(n.to_string()), Value::from),
        Db::UTinyInt(n) => Value::from(n),
        Db::USmallInt(n) => Value::from(n),
        Db::UInt(n) => Value::from(n),
        Db::UBigInt(n) => Value::from(n),
        Db::Float(f) => Value::from(f64::from(f)),
        Db::Double(f) => Value::from(f),
        Db::Text(s) | Db::Enum(s) => Value::from(s),
        Db::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map_or_else(|_| Value::from(d.to_string()), Value::from),
        Db::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map_or(Value::Null, |dt| Value::from(dt.date_naive().to_string())),
        Db::Timestamp(unit, n) => DateTime::from_timestamp_micros(to_micros(unit, n))
            .map_or(Value::Null, |dt| Value::from(dt.naive_utc().to_string())),
        other => Value::from(format!("{other:?}")),
    }
}

const fn to_micros(unit: TimeUnit, n: i64) -> i64 {
    match unit {
        TimeUnit::Second => n.saturating_mul(1_000_000),
        TimeUnit::Millisecond => n.saturating_mul(1_000),
        TimeUnit::Microsecond => n,
        TimeUnit::Nanosecond => n / 1_000,
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
