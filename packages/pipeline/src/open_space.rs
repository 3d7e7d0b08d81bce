//! Open space normalization.
//!
//! The protected and recreational open space layer only fills `MANAGER`
//! when the manager differs from the owner, and stores access, protection
//! and purpose as single-letter codes.

use milton_maps_codes::open_space;
use milton_maps_table::{GeoRow, GeoTable};
use serde_json::Value;

pub const FEE_OWNER_COLUMN: &str = "FEE_OWNER";
pub const MANAGER_COLUMN: &str = "MANAGER";
pub const PUB_ACCESS_COLUMN: &str = "PUB_ACCESS";
pub const LEV_PROT_COLUMN: &str = "LEV_PROT";
pub const PRIM_PURP_COLUMN: &str = "PRIM_PURP";

/// Backfills `MANAGER` and replaces coded columns with their labels.
///
/// Codes without a label become null.
#[must_use]
pub fn normalize_open_space(raw: GeoTable) -> GeoTable {
    let GeoTable { crs, mut rows } = raw;
    let mut backfilled = 0_usize;
    let mut unmapped = 0_usize;

    for row in &mut rows {
        if row.is_null(MANAGER_COLUMN) && !row.is_null(FEE_OWNER_COLUMN) {
            let owner = row.get(FEE_OWNER_COLUMN).clone();
            row.set(MANAGER_COLUMN, owner);
            backfilled += 1;
        }

        unmapped += relabel(row, PUB_ACCESS_COLUMN, open_space::public_access);
        unmapped += relabel(row, LEV_PROT_COLUMN, open_space::level_of_protection);
        unmapped += relabel(row, PRIM_PURP_COLUMN, open_space::primary_purpose);
    }

    log::info!(
        "Normalized {} open space records ({backfilled} managers backfilled)",
        rows.len()
    );
    if unmapped > 0 {
        log::warn!("{unmapped} open space codes had no label and were set to null");
    }

    GeoTable::new(crs, rows)
}

/// Replaces `column` with its label. Returns 1 if a non-null code was
/// dropped for lack of a label.
fn relabel(row: &mut GeoRow, column: &str, label: fn(&str) -> Option<&'static str>) -> usize {
    if !row.attributes.contains_key(column) {
        return 0;
    }

    let (value, dropped) = match row.get(column) {
        Value::Null => (Value::Null, false),
        Value::String(code) => label(code.trim())
            .map_or((Value::Null, true), |l| (Value::from(l), false)),
        _ => (Value::Null, true),
    };
    row.set(column, value);
    usize::from(dropped)
}
