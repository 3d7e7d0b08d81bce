//! Injury severity buckets for MassDOT crash records.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Coarse injury severity derived from the reported maximum injury.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum InjurySeverity {
    #[strum(serialize = "No Injury")]
    #[serde(rename = "No Injury")]
    NoInjury,
    #[strum(serialize = "Minor Injury")]
    #[serde(rename = "Minor Injury")]
    Minor,
    #[strum(serialize = "Major Injury")]
    #[serde(rename = "Major Injury")]
    Major,
    #[strum(serialize = "Fatal Injury")]
    #[serde(rename = "Fatal Injury")]
    Fatal,
    Unknown,
}

impl InjurySeverity {
    /// Classifies a `Maximum_Injury_Severity_Reported` value.
    ///
    /// Both the pre-2019 and the KABCO-style labels are recognized. A
    /// missing value is [`Self::Unknown`]; an unrecognized one is `None`.
    #[must_use]
    pub fn from_reported(reported: Option<&str>) -> Option<Self> {
        let Some(reported) = reported else {
            return Some(Self::Unknown);
        };

        match reported.trim() {
            "No injury"
            | "Not Applicable"
            | "Deceased not caused by crash"
            | "No Apparent Injury (O)" => Some(Self::NoInjury),
            "Non-fatal injury - Possible"
            | "Non-fatal injury - Non-incapacitating"
            | "Suspected Minor Injury (B)"
            | "Possible Injury (C)" => Some(Self::Minor),
            "Non-fatal injury - Incapacitating" | "Suspected Serious Injury (A)" => {
                Some(Self::Major)
            }
            "Fatal injury (K)" => Some(Self::Fatal),
            "Not reported" | "Unknown" | "" => Some(Self::Unknown),
            _ => None,
        }
    }
}
