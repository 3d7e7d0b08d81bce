//! Assessor database normalization.
//!
//! MassGIS parcel geodatabases ship one assessor table per town
//! (`M189Assess` for Milton). Each record gets a stable parcel identifier,
//! a cleaned site address, human-readable use labels and its town name.

use std::collections::BTreeSet;

use milton_maps_codes::land_use;
use milton_maps_table::{GeoRow, GeoTable};

use crate::town_ids::TownIdMap;
use crate::{PipelineError, scalar_text};

pub const LOC_ID_COLUMN: &str = "LOC_ID";
pub const TOWN_ID_COLUMN: &str = "TOWN_ID";
pub const PROP_ID_COLUMN: &str = "PROP_ID";
pub const SITE_ADDR_COLUMN: &str = "SITE_ADDR";
pub const USE_CODE_COLUMN: &str = "USE_CODE";

/// Derived parcel identifier, joined against the parcel layer's `LOC_ID`.
pub const PARCEL_ID_COLUMN: &str = "PARCEL_ID";
pub const USE_DESCRIPTION_COLUMN: &str = "USE_DESCRIPTION";
pub const IS_RESIDENTIAL_COLUMN: &str = "IS_RESIDENTIAL";
pub const TOWN_COLUMN: &str = "TOWN";

/// Normalizes a raw assessor table.
///
/// Adds `PARCEL_ID`, `USE_DESCRIPTION`, `IS_RESIDENTIAL` and `TOWN`, and
/// collapses whitespace in `SITE_ADDR`. All other columns pass through.
///
/// # Errors
///
/// Returns [`PipelineError::DataIntegrity`] naming every `TOWN_ID` that is
/// missing from `town_names`. Nothing is returned for the other rows.
pub fn normalize_assessor(
    raw: GeoTable,
    town_names: &TownIdMap,
) -> Result<GeoTable, PipelineError> {
    let GeoTable { crs, mut rows } = raw;
    let mut unresolved: BTreeSet<String> = BTreeSet::new();
    let mut missing_ids = 0_usize;
    let mut residential = 0_usize;

    for row in &mut rows {
        let parcel_id = parcel_id(row);
        if parcel_id.is_none() {
            missing_ids += 1;
        }
        row.set(PARCEL_ID_COLUMN, parcel_id);

        if let Some(address) = row.get_str(SITE_ADDR_COLUMN) {
            let cleaned = collapse_whitespace(address);
            row.set(SITE_ADDR_COLUMN, cleaned);
        }

        let use_code = scalar_text(row.get(USE_CODE_COLUMN));
        let is_residential = land_use::is_residential_use_code(use_code.as_deref());
        if is_residential {
            residential += 1;
        }
        row.set(
            USE_DESCRIPTION_COLUMN,
            land_use::describe_use_code(use_code.as_deref()),
        );
        row.set(IS_RESIDENTIAL_COLUMN, is_residential);

        match row
            .get_i64(TOWN_ID_COLUMN)
            .and_then(|id| town_names.name(id))
        {
            Some(town) => row.set(TOWN_COLUMN, town),
            None => {
                unresolved.insert(
                    scalar_text(row.get(TOWN_ID_COLUMN)).unwrap_or_else(|| "null".to_string()),
                );
            }
        }
    }

    if !unresolved.is_empty() {
        return Err(PipelineError::integrity(format!(
            "unmapped {TOWN_ID_COLUMN} values: {}",
            unresolved.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    if missing_ids > 0 {
        log::warn!(
            "{missing_ids} assessor records have neither {LOC_ID_COLUMN} nor \
             {TOWN_ID_COLUMN}+{PROP_ID_COLUMN}; {PARCEL_ID_COLUMN} left null"
        );
    }
    log::info!(
        "Normalized {} assessor records ({residential} residential)",
        rows.len()
    );

    Ok(GeoTable::new(crs, rows))
}

/// `LOC_ID` when present, otherwise `TOWN_ID` followed by `PROP_ID`.
///
/// An empty or whitespace-only `LOC_ID` counts as missing.
fn parcel_id(row: &GeoRow) -> Option<String> {
    if let Some(loc_id) = scalar_text(row.get(LOC_ID_COLUMN)).filter(|s| !s.trim().is_empty()) {
        return Some(loc_id);
    }

    let town_id = scalar_text(row.get(TOWN_ID_COLUMN))?;
    let prop_id = scalar_text(row.get(PROP_ID_COLUMN))?;
    Some(format!("{town_id}{prop_id}"))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::{Value, json};

    fn towns() -> TownIdMap {
        [(189, "MILTON".to_string()), (243, "QUINCY".to_string())]
            .into_iter()
            .collect()
    }

    fn record(pairs: &[(&str, Value)]) -> GeoRow {
        GeoRow::new(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            None,
        )
    }

    #[test]
    fn derives_id_and_labels() {
        let raw = GeoTable::new(
            None,
            vec![record(&[
                ("LOC_ID", Value::Null),
                ("TOWN_ID", json!(189)),
                ("PROP_ID", json!("00123")),
                ("USE_CODE", json!("1010")),
            ])],
        );

        let table = normalize_assessor(raw, &towns()).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.get_str("PARCEL_ID"), Some("18900123"));
        assert_eq!(row.get_str("USE_DESCRIPTION"), Some("Single Family"));
        assert_eq!(row.get("IS_RESIDENTIAL"), &json!(true));
        assert_eq!(row.get_str("TOWN"), Some("MILTON"));
        assert_eq!(row.get_str("PROP_ID"), Some("00123"));
    }

    #[test]
    fn prefers_loc_id_and_cleans_address() {
        let raw = GeoTable::new(
            None,
            vec![
                record(&[
                    ("LOC_ID", json!("F_775000_2937000")),
                    ("TOWN_ID", json!(243.0)),
                    ("PROP_ID", json!("9")),
                    ("SITE_ADDR", json!("  12   ADAMS   ST ")),
                    ("USE_CODE", json!("340")),
                ]),
                record(&[
                    ("LOC_ID", json!("  ")),
                    ("TOWN_ID", json!(243.0)),
                    ("PROP_ID", json!("A-1")),
                    ("SITE_ADDR", Value::Null),
                ]),
            ],
        );

        let table = normalize_assessor(raw, &towns()).unwrap();
        assert_eq!(table.rows[0].get_str("PARCEL_ID"), Some("F_775000_2937000"));
        assert_eq!(table.rows[0].get_str("SITE_ADDR"), Some("12 ADAMS ST"));
        assert_eq!(table.rows[0].get_str("USE_DESCRIPTION"), Some("General Office Buildings"));
        assert_eq!(table.rows[0].get("IS_RESIDENTIAL"), &json!(false));
        assert_eq!(table.rows[0].get_str("TOWN"), Some("QUINCY"));

        assert_eq!(table.rows[1].get_str("PARCEL_ID"), Some("243A-1"));
        assert!(table.rows[1].is_null("SITE_ADDR"));
        assert_eq!(table.rows[1].get_str("USE_DESCRIPTION"), Some("Other"));
        assert_eq!(table.rows[1].get("IS_RESIDENTIAL"), &json!(false));
    }

    #[test]
    fn unmapped_town_aborts() {
        let raw = GeoTable::new(
            None,
            vec![
                record(&[("TOWN_ID", json!(189)), ("PROP_ID", json!("1"))]),
                record(&[("TOWN_ID", json!(999)), ("PROP_ID", json!("2"))]),
            ],
        );

        let err = normalize_assessor(raw, &towns()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrityViolation);
        assert!(err.to_string().contains("999"));
        assert!(!err.to_string().contains("189"));
    }

    #[test]
    fn missing_parts_leave_parcel_id_null() {
        let raw = GeoTable::new(
            None,
            vec![record(&[("TOWN_ID", json!(189)), ("USE_CODE", json!("013"))])],
        );

        let table = normalize_assessor(raw, &towns()).unwrap();
        assert!(table.rows[0].is_null("PARCEL_ID"));
        assert_eq!(table.rows[0].get("IS_RESIDENTIAL"), &json!(true));
    }
}
