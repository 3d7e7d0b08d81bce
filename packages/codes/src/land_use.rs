//! Property land-use codes from the Massachusetts DOR classification
//! codebook.
//!
//! Assessor databases carry a three-digit state use code, optionally
//! followed by a fourth community-specific digit. Only the three-digit
//! prefix is meaningful statewide.

/// Label used for any use code that is not in [`use_description`].
pub const OTHER_USE: &str = "Other";

/// Three-digit use-code prefixes that denote residential property.
pub const RESIDENTIAL_USE_CODES: &[&str] = &["101", "102", "103", "104", "105", "109", "013"];

/// Returns the statewide three-digit prefix of a use code.
///
/// Returns `None` when the code is shorter than three characters.
#[must_use]
pub fn use_code_prefix(use_code: &str) -> Option<&str> {
    use_code.get(..3)
}

/// Maps a three-digit use-code prefix to its codebook description.
///
/// Returns `None` for prefixes without a known description.
#[must_use]
pub fn use_description(prefix: &str) -> Option<&'static str> {
    match prefix {
        "101" => Some("Single Family"),
        "102" => Some("Condominium"),
        "103" => Some("Mobile Home"),
        "104" => Some("Two-Family"),
        "105" => Some("Three-Family"),
        "106" => Some("Accessory Land with Improvement - garage,etc."),
        "109" => Some(
            "Multiple Houses on one parcel (for example, a single and a two-family on one parcel)",
        ),
        "130" => Some(
            "Vacant Land in a Residential Zone or Accessory to Residential Parcel, Developable Land",
        ),
        "131" => Some(
            "Vacant Land in a Residential Zone or Accessory to Residential Parcel, Potentially Developable Land",
        ),
        "132" => Some("Undevelopable Land"),
        "325" => Some("Small Retail and Services stores (under 10,000 sq. ft.)"),
        "337" => Some("Parking Lots - a commercial open parking lot for motor vehicles"),
        "340" => Some("General Office Buildings"),
        // Not in the codebook, but the 34x prefix is office buildings.
        "343" => Some("Office Building"),
        "920" => Some(
            "Department of Conservation and Recreation, Division of Urban Parks and Recreation",
        ),
        "930" => Some("Municipal, Vacant, Selectmen or City Council"),
        "931" => Some("Municipal, Improved, Selectmen or City Council"),
        "932" => Some("Municipal, Vacant, Conservation"),
        "942" => Some("Educational Private, College or University"),
        "945" => Some("Educational Private, Affilliated Housing"),
        "950" => Some("Charitable, Vacant, Conservation Organizations"),
        "960" => Some("Church, Mosque, Synagogue, Temple, etc"),
        "013" => Some("Multiple-Use, primarily Residential"),
        "031" => Some("Multiple-Use, primarily Commercial"),
        _ => None,
    }
}

/// Describes a raw use code, falling back to [`OTHER_USE`].
///
/// Missing and short codes are described as [`OTHER_USE`] as well.
#[must_use]
pub fn describe_use_code(use_code: Option<&str>) -> &'static str {
    use_code
        .and_then(use_code_prefix)
        .and_then(use_description)
        .unwrap_or(OTHER_USE)
}

/// Whether a raw use code denotes residential property.
#[must_use]
pub fn is_residential_use_code(use_code: Option<&str>) -> bool {
    use_code
        .and_then(use_code_prefix)
        .is_some_and(|prefix| RESIDENTIAL_USE_CODES.contains(&prefix))
}
