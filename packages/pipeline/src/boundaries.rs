//! Town boundary consolidation.
//!
//! The MassGIS town survey stores each town as one or more polygon
//! fragments (islands, exclaves) that share a `TOWN_ID`. Consolidation
//! merges each town's fragments into a single multipolygon, keeps only the
//! attributes that agree across every fragment of every town, and verifies
//! that no area was lost or gained along the way.

use std::collections::BTreeMap;

use geo::{Area, Geometry, MultiPolygon, Polygon};
use milton_maps_table::{Attributes, GeoRow, GeoTable};
use serde_json::Value;

use crate::PipelineError;
use crate::config::BoundaryConfig;
use crate::town_ids::TownIdMap;

/// Derived area in acres.
pub const ACRES_COLUMN: &str = "ACRES";

/// Derived area in square miles.
pub const SQUARE_MILES_COLUMN: &str = "SQUARE_MIL";

const SQUARE_METERS_PER_ACRE: f64 = 4046.86;
const SQUARE_METERS_PER_SQUARE_MILE: f64 = 2_590_000.0;

/// Output of [`consolidate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedBoundaries {
    /// One row per town, ordered by town id.
    pub towns: GeoTable,
    /// Town id to town name, for the assessor stage.
    pub town_ids: TownIdMap,
}

/// Merges town boundary fragments into one record per town.
///
/// # Errors
///
/// * [`PipelineError::SchemaMismatch`] if a fragment has no integer town
///   id, no polygonal geometry, or no numeric area; if the town name does
///   not survive as an invariant column; or if the number of columns differs
///   from `config.expected_column_count`.
/// * [`PipelineError::DataIntegrity`] if the number of towns differs from
///   `config.expected_town_count`, a town's merged area differs from the
///   sum of its fragments by more than `config.area_tolerance`, or a town
///   has no name.
pub fn consolidate(
    fragments: &GeoTable,
    config: &BoundaryConfig,
) -> Result<ConsolidatedBoundaries, PipelineError> {
    let groups = group_by_town(fragments, &config.town_id_column)?;
    log::info!(
        "Consolidating {} fragments into {} towns",
        fragments.len(),
        groups.len()
    );

    let invariant = invariant_columns(fragments, &groups, config);
    log::debug!("Invariant columns: {}", invariant.join(", "));

    let mut rows = Vec::with_capacity(groups.len());
    for (town_id, members) in &groups {
        rows.push(merge_town(*town_id, members, &invariant, config)?);
    }

    let towns = GeoTable::new(fragments.crs.clone(), rows);
    validate(&towns, &groups, config)?;

    let town_ids = town_id_map(&towns, config)?;
    log::info!("Consolidated {} towns", towns.len());

    Ok(ConsolidatedBoundaries { towns, town_ids })
}

fn group_by_town<'a>(
    fragments: &'a GeoTable,
    town_id_column: &str,
) -> Result<BTreeMap<i64, Vec<&'a GeoRow>>, PipelineError> {
    let mut groups: BTreeMap<i64, Vec<&GeoRow>> = BTreeMap::new();

    for (index, row) in fragments.rows.iter().enumerate() {
        let town_id = row.get_i64(town_id_column).ok_or_else(|| {
            PipelineError::schema(format!(
                "fragment {index} has no integer {town_id_column} (found {})",
                row.get(town_id_column)
            ))
        })?;
        groups.entry(town_id).or_default().push(row);
    }

    Ok(groups)
}

/// Columns whose value is the same for every fragment of each town.
///
/// Null counts as a value, so a column that is null for one fragment and
/// set for another is dropped. The key column and the derived area columns
/// are excluded; they are written separately.
fn invariant_columns(
    fragments: &GeoTable,
    groups: &BTreeMap<i64, Vec<&GeoRow>>,
    config: &BoundaryConfig,
) -> Vec<String> {
    let derived = [
        config.town_id_column.as_str(),
        config.area_column.as_str(),
        ACRES_COLUMN,
        SQUARE_MILES_COLUMN,
    ];

    fragments
        .columns()
        .into_iter()
        .filter(|column| !derived.contains(&column.as_str()))
        .filter(|column| {
            let invariant = groups
                .values()
                .all(|members| distinct_values(members, column) <= 1);
            if !invariant {
                log::debug!("Dropping column {column}: varies within a town");
            }
            invariant
        })
        .collect()
}

fn distinct_values(members: &[&GeoRow], column: &str) -> usize {
    let mut seen: Vec<&Value> = Vec::new();
    for row in members {
        let value = row.get(column);
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen.len()
}

fn merge_town(
    town_id: i64,
    members: &[&GeoRow],
    invariant: &[String],
    config: &BoundaryConfig,
) -> Result<GeoRow, PipelineError> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for row in members {
        match &row.geometry {
            Some(Geometry::Polygon(polygon)) => polygons.push(polygon.clone()),
            Some(Geometry::MultiPolygon(multi)) => polygons.extend(multi.0.iter().cloned()),
            other => {
                return Err(PipelineError::schema(format!(
                    "town {town_id} has a fragment without polygon geometry ({})",
                    geometry_kind(other.as_ref())
                )));
            }
        }
    }

    let merged = MultiPolygon(polygons);
    let area = merged.unsigned_area();

    let mut attributes = Attributes::new();
    if let Some(first) = members.first() {
        for column in invariant {
            attributes.insert(column.clone(), first.get(column).clone());
        }
    }
    attributes.insert(config.town_id_column.clone(), Value::from(town_id));
    attributes.insert(config.area_column.clone(), Value::from(area));
    attributes.insert(
        ACRES_COLUMN.to_string(),
        Value::from(area / SQUARE_METERS_PER_ACRE),
    );
    attributes.insert(
        SQUARE_MILES_COLUMN.to_string(),
        Value::from(area / SQUARE_METERS_PER_SQUARE_MILE),
    );

    log::debug!(
        "Town {town_id}: {} fragments, {} polygons, area {area:.1}",
        members.len(),
        merged.0.len()
    );

    Ok(GeoRow::new(attributes, Some(merged.into())))
}

const fn geometry_kind(geometry: Option<&Geometry<f64>>) -> &'static str {
    match geometry {
        None => "none",
        Some(Geometry::Point(_)) => "Point",
        Some(Geometry::Line(_)) => "Line",
        Some(Geometry::LineString(_)) => "LineString",
        Some(Geometry::Polygon(_)) => "Polygon",
        Some(Geometry::MultiPoint(_)) => "MultiPoint",
        Some(Geometry::MultiLineString(_)) => "MultiLineString",
        Some(Geometry::MultiPolygon(_)) => "MultiPolygon",
        Some(Geometry::GeometryCollection(_)) => "GeometryCollection",
        Some(Geometry::Rect(_)) => "Rect",
        Some(Geometry::Triangle(_)) => "Triangle",
    }
}

/// Number of output columns as counted by the survey: every attribute
/// except the town-id key, plus the geometry.
fn column_count(towns: &GeoTable, config: &BoundaryConfig) -> usize {
    let attributes = towns
        .columns()
        .iter()
        .filter(|c| **c != config.town_id_column)
        .count();
    attributes + usize::from(towns.has_geometry())
}

fn validate(
    towns: &GeoTable,
    groups: &BTreeMap<i64, Vec<&GeoRow>>,
    config: &BoundaryConfig,
) -> Result<(), PipelineError> {
    if !towns.has_column(&config.town_name_column) {
        return Err(PipelineError::schema(format!(
            "town name column {} is missing or varies within a town",
            config.town_name_column
        )));
    }

    if towns.len() != config.expected_town_count {
        return Err(PipelineError::integrity(format!(
            "expected {} towns, found {}",
            config.expected_town_count,
            towns.len()
        )));
    }

    let columns = column_count(towns, config);
    if columns != config.expected_column_count {
        return Err(PipelineError::schema(format!(
            "expected {} columns, found {columns}: {}",
            config.expected_column_count,
            towns.columns().join(", ")
        )));
    }

    for town in &towns.rows {
        let Some(town_id) = town.get_i64(&config.town_id_column) else {
            continue;
        };
        let Some(members) = groups.get(&town_id) else {
            continue;
        };

        let mut fragment_sum = 0.0;
        for fragment in members {
            fragment_sum += fragment.get_f64(&config.area_column).ok_or_else(|| {
                PipelineError::schema(format!(
                    "a fragment of town {town_id} has no numeric {}",
                    config.area_column
                ))
            })?;
        }

        let area = town.get_f64(&config.area_column).unwrap_or(f64::NAN);
        let error = relative_error(area, fragment_sum);
        if error.is_nan() || error >= config.area_tolerance {
            return Err(PipelineError::integrity(format!(
                "town {town_id} area {area} differs from fragment sum {fragment_sum} \
                 (relative error {error:e}, tolerance {:e})",
                config.area_tolerance
            )));
        }
    }

    Ok(())
}

fn relative_error(actual: f64, expected: f64) -> f64 {
    let diff = (actual - expected).abs();
    if diff == 0.0 { 0.0 } else { diff / expected.abs() }
}

fn town_id_map(towns: &GeoTable, config: &BoundaryConfig) -> Result<TownIdMap, PipelineError> {
    towns
        .rows
        .iter()
        .map(|town| {
            let town_id = town.get_i64(&config.town_id_column).unwrap_or_default();
            let name = town.get_str(&config.town_name_column).ok_or_else(|| {
                PipelineError::integrity(format!(
                    "town {town_id} has no {}",
                    config.town_name_column
                ))
            })?;
            Ok((town_id, name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use geo::{Rect, coord};
    use serde_json::json;

    /// Axis-aligned rectangle polygon of the given size, offset along x so
    /// fragments never overlap.
    fn rect(x: f64, width: f64, height: f64) -> Geometry<f64> {
        Rect::new(coord! { x: x, y: 0.0 }, coord! { x: x + width, y: height })
            .to_polygon()
            .into()
    }

    fn fragment(town_id: i64, name: &str, geometry: Geometry<f64>) -> GeoRow {
        let mut row = GeoRow::default();
        row.set("TOWN_ID", town_id);
        row.set("TOWN", name);
        row.set("SHAPE_AREA", geometry.unsigned_area());
        row.geometry = Some(geometry);
        row
    }

    /// Two towns, with `TOWN` + the three derived columns + geometry.
    fn small_config() -> BoundaryConfig {
        BoundaryConfig {
            expected_town_count: 2,
            expected_column_count: 5,
            ..BoundaryConfig::default()
        }
    }

    fn example_fragments() -> GeoTable {
        GeoTable::new(
            Some("EPSG:26986".to_string()),
            vec![
                fragment(1, "A", rect(0.0, 5.0, 2.0)),
                fragment(1, "A", rect(100.0, 5.0, 1.0)),
                fragment(2, "B", rect(200.0, 7.0, 1.0)),
            ],
        )
    }

    #[test]
    fn merges_fragments_and_sums_area() {
        let result = consolidate(&example_fragments(), &small_config()).unwrap();

        assert_eq!(result.towns.len(), 2);
        assert_eq!(result.towns.crs.as_deref(), Some("EPSG:26986"));

        let a = &result.towns.rows[0];
        assert_eq!(a.get_i64("TOWN_ID"), Some(1));
        assert_eq!(a.get_str("TOWN"), Some("A"));
        assert!((a.get_f64("SHAPE_AREA").unwrap() - 15.0).abs() < 1e-12);
        assert!((a.get_f64("ACRES").unwrap() - 15.0 / 4046.86).abs() < 1e-15);
        assert!((a.get_f64("SQUARE_MIL").unwrap() - 15.0 / 2_590_000.0).abs() < 1e-15);
        match &a.geometry {
            Some(Geometry::MultiPolygon(multi)) => assert_eq!(multi.0.len(), 2),
            other => panic!("expected a multipolygon, got {other:?}"),
        }

        let b = &result.towns.rows[1];
        assert_eq!(b.get_str("TOWN"), Some("B"));
        assert!((b.get_f64("SHAPE_AREA").unwrap() - 7.0).abs() < 1e-12);

        assert_eq!(result.town_ids.name(1), Some("A"));
        assert_eq!(result.town_ids.name(2), Some("B"));
    }

    #[test]
    fn drops_columns_that_vary_within_a_town() {
        let mut fragments = example_fragments();
        fragments.rows[0].set("FOURCOLOR", 1);
        fragments.rows[1].set("FOURCOLOR", 2);
        fragments.rows[2].set("FOURCOLOR", 3);
        fragments.rows[0].set("POP2010", 100);
        // absent on the second fragment of town 1, so null != 100
        fragments.rows[2].set("POP2010", 50);
        fragments.rows[0].set("TYPE", "T");
        fragments.rows[1].set("TYPE", "T");
        fragments.rows[2].set("TYPE", "C");

        let config = BoundaryConfig {
            expected_column_count: 6,
            ..small_config()
        };
        let result = consolidate(&fragments, &config).unwrap();

        assert!(result.towns.has_column("TYPE"));
        assert!(!result.towns.has_column("FOURCOLOR"));
        assert!(!result.towns.has_column("POP2010"));
        assert_eq!(result.towns.rows[1].get_str("TYPE"), Some("C"));
    }

    #[test]
    fn full_survey_with_default_config() {
        let extra: Vec<String> = (0..14).map(|i| format!("EXTRA_{i:02}")).collect();
        let mut rows = Vec::new();
        for town_id in 1..=351_i64 {
            #[allow(clippy::cast_precision_loss)]
            let x = town_id as f64 * 10.0;
            for offset in [0.0, 5.0] {
                let name = format!("TOWN {town_id}");
                let mut row = fragment(town_id, &name, rect(x + offset, 2.0, 3.0));
                for column in &extra {
                    row.set(column, town_id);
                }
                rows.push(row);
            }
        }
        let fragments = GeoTable::new(Some("EPSG:26986".to_string()), rows);

        let result = consolidate(&fragments, &BoundaryConfig::default()).unwrap();
        assert_eq!(result.towns.len(), 351);
        assert_eq!(result.town_ids.len(), 351);
        assert_eq!(column_count(&result.towns, &BoundaryConfig::default()), 19);
    }

    #[test]
    fn wrong_town_count_is_integrity_violation() {
        let config = BoundaryConfig {
            expected_town_count: 3,
            ..small_config()
        };
        let err = consolidate(&example_fragments(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrityViolation);
    }

    #[test]
    fn wrong_column_count_is_schema_mismatch() {
        let config = BoundaryConfig {
            expected_column_count: 19,
            ..small_config()
        };
        let err = consolidate(&example_fragments(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("expected 19 columns, found 5"));
    }

    #[test]
    fn varying_town_name_is_schema_mismatch() {
        let mut fragments = example_fragments();
        fragments.rows[1].set("TOWN", "A-ISLAND");
        let err = consolidate(&fragments, &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("TOWN"));
    }

    #[test]
    fn area_drift_is_integrity_violation() {
        let mut fragments = example_fragments();
        fragments.rows[2].set("SHAPE_AREA", 7.5);
        let err = consolidate(&fragments, &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrityViolation);
        assert!(err.to_string().contains("town 2"));
    }

    #[test]
    fn missing_fragment_area_is_schema_mismatch() {
        let mut fragments = example_fragments();
        fragments.rows[0].set("SHAPE_AREA", Value::Null);
        let err = consolidate(&fragments, &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn missing_town_id_is_schema_mismatch() {
        let mut fragments = example_fragments();
        fragments.rows[0].set("TOWN_ID", json!("north"));
        let err = consolidate(&fragments, &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn non_polygon_fragment_is_schema_mismatch() {
        let mut fragments = example_fragments();
        fragments.rows[0].geometry = Some(geo::Point::new(0.0, 0.0).into());
        let err = consolidate(&fragments, &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn null_town_name_is_integrity_violation() {
        let mut fragments = example_fragments();
        fragments.rows[2].set("TOWN", Value::Null);
        let err = consolidate(&fragments, &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrityViolation);
    }

    #[test]
    fn relative_error_handles_zero() {
        assert!(relative_error(0.0, 0.0) < 1e-9);
        assert!(relative_error(1.0, 0.0).is_infinite());
        assert!((relative_error(15.0, 10.0) - 0.5).abs() < 1e-12);
    }
}
