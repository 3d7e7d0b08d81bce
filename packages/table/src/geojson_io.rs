//! `GeoJSON` `FeatureCollection` encoding of [`GeoTable`]s.
//!
//! The CRS tag travels in the legacy `crs` foreign member
//! (`{"type": "name", "properties": {"name": ...}}`), which GDAL and
//! geopandas both read and write.

use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};

use crate::{GeoRow, GeoTable, TableError};

/// Parses a `GeoJSON` document into a table.
///
/// A bare `Feature` becomes a one-row table.
pub fn parse(text: &str) -> Result<GeoTable, TableError> {
    let geojson: GeoJson = text.parse()?;

    match geojson {
        GeoJson::FeatureCollection(collection) => from_feature_collection(collection),
        GeoJson::Feature(feature) => Ok(GeoTable::new(None, vec![feature_to_row(feature)?])),
        GeoJson::Geometry(_) => Err(TableError::InvalidGeometry {
            message: "expected a FeatureCollection, found a bare geometry".to_string(),
        }),
    }
}

/// Serializes a table as a `GeoJSON` `FeatureCollection` string.
pub fn to_string(table: &GeoTable) -> Result<String, TableError> {
    let collection = to_feature_collection(table);
    Ok(serde_json::to_string(&collection)?)
}

fn from_feature_collection(collection: FeatureCollection) -> Result<GeoTable, TableError> {
    let crs = collection.foreign_members.as_ref().and_then(crs_name);

    let rows = collection
        .features
        .into_iter()
        .map(feature_to_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GeoTable::new(crs, rows))
}

fn feature_to_row(feature: Feature) -> Result<GeoRow, TableError> {
    let attributes = feature
        .properties
        .map(|props| props.into_iter().collect())
        .unwrap_or_default();

    let geometry = feature
        .geometry
        .map(geo::Geometry::<f64>::try_from)
        .transpose()?;

    Ok(GeoRow::new(attributes, geometry))
}

fn to_feature_collection(table: &GeoTable) -> FeatureCollection {
    let features = table
        .rows
        .iter()
        .map(|row| Feature {
            bbox: None,
            geometry: row
                .geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: None,
            properties: Some(
                row.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            foreign_members: None,
        })
        .collect();

    let foreign_members = table.crs.as_ref().map(|crs| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": crs },
            }),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

fn crs_name(members: &JsonObject) -> Option<String> {
    members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(ToString::to_string)
}

/// Parses a standalone `GeoJSON` geometry string.
pub fn parse_geometry(text: &str) -> Result<geo::Geometry<f64>, TableError> {
    match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => Ok(geo::Geometry::<f64>::try_from(geometry)?),
        _ => Err(TableError::InvalidGeometry {
            message: "expected a GeoJSON geometry".to_string(),
        }),
    }
}

/// Serializes a geometry as a `GeoJSON` geometry string.
pub fn geometry_to_string(geometry: &geo::Geometry<f64>) -> Result<String, TableError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(geometry));
    Ok(serde_json::to_string(&geometry)?)
}
