//! Tax parcel and assessor join.
//!
//! Tax parcel shapes are keyed by `LOC_ID`; normalized assessor records
//! carry the same identifier as `PARCEL_ID`. The join is a full outer join
//! so that coverage gaps on either side show up in the statistics instead
//! of disappearing silently.

use std::collections::{BTreeMap, BTreeSet};

use milton_maps_table::{Attributes, GeoRow, GeoTable};
use serde_json::Value;

use crate::assessor::{IS_RESIDENTIAL_COLUMN, LOC_ID_COLUMN, PARCEL_ID_COLUMN};
use crate::{PipelineError, scalar_text};

/// Assessor columns attached to each parcel.
pub const ASSESSOR_JOIN_COLUMNS: &[&str] = &[
    "PARCEL_ID",
    "TOWN",
    "YEAR_BUILT",
    "USE_DESCRIPTION",
    "RES_AREA",
    "ZONING",
    "UNITS",
    "STYLE",
    "LOT_SIZE",
    "TOTAL_VAL",
    "LAND_VAL",
    "SITE_ADDR",
    "IS_RESIDENTIAL",
];

/// Row counts of a parcel join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Output rows with both a parcel shape and an assessor record.
    pub matched: usize,
    /// Parcel shapes without an assessor record.
    pub parcels_only: usize,
    /// Assessor records without a parcel shape.
    pub assessor_only: usize,
}

/// Output of [`join_residential`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelJoin {
    /// Every row of the outer join.
    pub joined: GeoTable,
    /// Rows flagged residential.
    pub residential: GeoTable,
    pub stats: JoinStats,
}

/// Joins parcel shapes with normalized assessor records, town by town, and
/// keeps the residential parcels.
///
/// `parcels[i]` and `assessors[i]` are expected to describe the same town.
/// Rows missing `IS_RESIDENTIAL` are treated as non-residential.
///
/// # Errors
///
/// * [`PipelineError::DataIntegrity`] if the two lists differ in length.
/// * [`PipelineError::SchemaMismatch`] if the parcel tables disagree on CRS.
pub fn join_residential(
    parcels: Vec<GeoTable>,
    assessors: Vec<GeoTable>,
) -> Result<ParcelJoin, PipelineError> {
    if parcels.len() != assessors.len() {
        return Err(PipelineError::integrity(format!(
            "got {} parcel tables but {} assessor tables",
            parcels.len(),
            assessors.len()
        )));
    }

    let parcels = GeoTable::concat(parcels)?;
    let assessors = GeoTable::concat(assessors)?;
    log::info!(
        "Joining {} parcel shapes with {} assessor records",
        parcels.len(),
        assessors.len()
    );

    let (joined, stats) = outer_join(&parcels, &assessors);
    log::info!(
        "Join coverage: {} matched, {} parcels without assessor record, {} assessor records without parcel",
        stats.matched,
        stats.parcels_only,
        stats.assessor_only
    );

    let residential = GeoTable::new(
        joined.crs.clone(),
        joined
            .rows
            .iter()
            .filter(|row| row.get(IS_RESIDENTIAL_COLUMN) == &Value::Bool(true))
            .cloned()
            .collect(),
    );
    log::info!(
        "{} of {} joined rows are residential",
        residential.len(),
        joined.len()
    );

    Ok(ParcelJoin {
        joined,
        residential,
        stats,
    })
}

fn outer_join(parcels: &GeoTable, assessors: &GeoTable) -> (GeoTable, JoinStats) {
    let mut by_parcel_id: BTreeMap<String, Vec<&GeoRow>> = BTreeMap::new();
    for record in &assessors.rows {
        if let Some(id) = scalar_text(record.get(PARCEL_ID_COLUMN)) {
            by_parcel_id.entry(id).or_default().push(record);
        }
    }

    let mut stats = JoinStats::default();
    let mut matched_ids: BTreeSet<&str> = BTreeSet::new();
    let mut rows = Vec::with_capacity(parcels.len());

    for parcel in &parcels.rows {
        let records = scalar_text(parcel.get(LOC_ID_COLUMN))
            .and_then(|id| by_parcel_id.get_key_value(&id));

        if let Some((id, records)) = records {
            matched_ids.insert(id);
            for record in records {
                let mut row = parcel.clone();
                attach(&mut row.attributes, Some(*record));
                rows.push(row);
                stats.matched += 1;
            }
        } else {
            let mut row = parcel.clone();
            attach(&mut row.attributes, None);
            rows.push(row);
            stats.parcels_only += 1;
        }
    }

    for record in &assessors.rows {
        let id = scalar_text(record.get(PARCEL_ID_COLUMN));
        if id.as_deref().is_some_and(|id| matched_ids.contains(id)) {
            continue;
        }

        let mut attributes = Attributes::new();
        attach(&mut attributes, Some(record));
        attributes.insert(LOC_ID_COLUMN.to_string(), id.map_or(Value::Null, Value::from));
        rows.push(GeoRow::new(attributes, None));
        stats.assessor_only += 1;
    }

    (GeoTable::new(parcels.crs.clone(), rows), stats)
}

/// Copies the assessor join columns into `attributes`, or nulls when there
/// is no record.
fn attach(attributes: &mut Attributes, record: Option<&GeoRow>) {
    for column in ASSESSOR_JOIN_COLUMNS {
        let value = record.map_or(Value::Null, |r| r.get(column).clone());
        attributes.insert((*column).to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use geo::point;
    use serde_json::json;

    fn parcel(loc_id: &str) -> GeoRow {
        let mut row = GeoRow::default();
        row.set("LOC_ID", loc_id);
        row.set("MAP_PAR_ID", format!("map-{loc_id}"));
        row.geometry = Some(point!(x: 1.0, y: 2.0).into());
        row
    }

    fn record(parcel_id: &str, residential: Option<bool>) -> GeoRow {
        let mut row = GeoRow::default();
        row.set("PARCEL_ID", parcel_id);
        row.set("TOWN", "MILTON");
        row.set("OWNER1", "not joined");
        if let Some(residential) = residential {
            row.set("IS_RESIDENTIAL", residential);
        }
        row
    }

    fn table(rows: Vec<GeoRow>) -> GeoTable {
        GeoTable::new(Some("EPSG:26986".to_string()), rows)
    }

    #[test]
    fn outer_join_counts_and_residential_filter() {
        let parcels = table(vec![parcel("A"), parcel("B"), parcel("C")]);
        let assessors = table(vec![
            record("A", Some(true)),
            record("B", Some(false)),
            record("D", Some(true)),
        ]);

        let result = join_residential(vec![parcels], vec![assessors]).unwrap();
        assert_eq!(
            result.stats,
            JoinStats {
                matched: 2,
                parcels_only: 1,
                assessor_only: 1,
            }
        );
        assert_eq!(result.joined.len(), 4);

        let a = &result.joined.rows[0];
        assert_eq!(a.get_str("PARCEL_ID"), Some("A"));
        assert_eq!(a.get_str("MAP_PAR_ID"), Some("map-A"));
        assert!(a.geometry.is_some());
        assert!(!a.attributes.contains_key("OWNER1"));

        let c = &result.joined.rows[2];
        assert!(c.is_null("PARCEL_ID"));
        assert!(c.is_null("IS_RESIDENTIAL"));

        let d = &result.joined.rows[3];
        assert_eq!(d.get_str("LOC_ID"), Some("D"));
        assert!(d.geometry.is_none());

        let residential: Vec<_> = result
            .residential
            .rows
            .iter()
            .map(|r| r.get_str("LOC_ID").unwrap())
            .collect();
        assert_eq!(residential, vec!["A", "D"]);
        assert_eq!(result.residential.crs.as_deref(), Some("EPSG:26986"));
    }

    #[test]
    fn duplicate_keys_expand() {
        let parcels = table(vec![parcel("A"), parcel("A")]);
        let assessors = table(vec![record("A", Some(true)), record("A", None)]);

        let result = join_residential(vec![parcels], vec![assessors]).unwrap();
        assert_eq!(result.stats.matched, 4);
        assert_eq!(result.stats.assessor_only, 0);
        assert_eq!(result.residential.len(), 2);
    }

    #[test]
    fn concatenates_towns() {
        let result = join_residential(
            vec![table(vec![parcel("M1")]), table(vec![parcel("Q1")])],
            vec![
                table(vec![record("M1", Some(true))]),
                table(vec![record("Q1", Some(true))]),
            ],
        )
        .unwrap();
        assert_eq!(result.stats.matched, 2);
        assert_eq!(result.residential.len(), 2);
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let err = join_residential(vec![table(vec![])], vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrityViolation);
    }

    #[test]
    fn conflicting_crs_is_schema_mismatch() {
        let err = join_residential(
            vec![
                table(vec![parcel("A")]),
                GeoTable::new(Some("EPSG:4326".to_string()), vec![parcel("B")]),
            ],
            vec![table(vec![]), table(vec![])],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn missing_flag_counts_as_not_residential() {
        let result = join_residential(
            vec![table(vec![parcel("A")])],
            vec![table(vec![record("A", None)])],
        )
        .unwrap();
        assert!(result.residential.is_empty());
        assert_eq!(result.joined.rows[0].get("IS_RESIDENTIAL"), &json!(null));
    }
}
