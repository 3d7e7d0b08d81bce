//! Code tables for the MassGIS protected and recreational open space
//! layer.
//!
//! Unlike land-use codes, an unrecognized open-space code has no fallback
//! label: the lookups return `None` and callers keep the value null.

/// Maps a `PUB_ACCESS` code to its label.
#[must_use]
pub fn public_access(code: &str) -> Option<&'static str> {
    match code {
        "Y" => Some("Yes (open to public)"),
        "N" => Some("No (not open to public)"),
        "L" => Some("Limited (membership only)"),
        "X" => Some("Unknown"),
        _ => None,
    }
}

/// Maps a `LEV_PROT` code to its label.
#[must_use]
pub fn level_of_protection(code: &str) -> Option<&'static str> {
    match code {
        "P" => Some("In Perpetuity"),
        "T" => Some("Temporary"),
        "L" => Some("Limited"),
        "N" => Some("None"),
        _ => None,
    }
}

/// Maps a `PRIM_PURP` code to its label.
#[must_use]
pub fn primary_purpose(code: &str) -> Option<&'static str> {
    match code {
        "R" => Some("Recreation (activities are facility based)"),
        "C" => Some("Conservation (activities are non-facility based)"),
        "B" => Some("Recreation and Conservation"),
        "H" => Some("Historical/Cultural"),
        "A" => Some("Agricultural"),
        "W" => Some("Water Supply Protection"),
        "S" => Some("Scenic (official designation only)"),
        "F" => Some("Flood Control"),
        "U" => Some("Site is underwater"),
        "O" => Some("Other (explain)"),
        "X" => Some("Unknown"),
        _ => None,
    }
}
