//! `MessagePack` table serialization.
//!
//! Attributes are stored as-is so integers, floats, booleans, strings and
//! nulls keep their types. Geometries are stored as `GeoJSON` text, the
//! same representation the boundary tables use on disk.

use serde::{Deserialize, Serialize};

use crate::{Attributes, GeoRow, GeoTable, TableError, geojson_io};

#[derive(Debug, Serialize, Deserialize)]
struct StoredTable {
    crs: Option<String>,
    rows: Vec<StoredRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    attributes: Attributes,
    geometry_geojson: Option<String>,
}

/// Encodes a table as `MessagePack` bytes.
pub fn encode(table: &GeoTable) -> Result<Vec<u8>, TableError> {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            Ok(StoredRow {
                attributes: row.attributes.clone(),
                geometry_geojson: row
                    .geometry
                    .as_ref()
                    .map(geojson_io::geometry_to_string)
                    .transpose()?,
            })
        })
        .collect::<Result<Vec<_>, TableError>>()?;

    let stored = StoredTable {
        crs: table.crs.clone(),
        rows,
    };

    Ok(rmp_serde::to_vec_named(&stored)?)
}

/// Decodes a table from `MessagePack` bytes.
pub fn decode(bytes: &[u8]) -> Result<GeoTable, TableError> {
    let stored: StoredTable = rmp_serde::from_slice(bytes)?;

    let rows = stored
        .rows
        .into_iter()
        .map(|row| {
            let geometry = row
                .geometry_geojson
                .as_deref()
                .map(geojson_io::parse_geometry)
                .transpose()?;
            Ok(GeoRow::new(row.attributes, geometry))
        })
        .collect::<Result<Vec<_>, TableError>>()?;

    Ok(GeoTable::new(stored.crs, rows))
}
