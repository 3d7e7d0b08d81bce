//! The town-id to town-name mapping handed from boundary consolidation to
//! assessor normalization.
//!
//! The two stages usually run as separate invocations, so the mapping is
//! persisted as a JSON object with stringified integer keys
//! (`{"189": "MILTON"}`), the format the downstream stage reads back.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Mapping from MassGIS `TOWN_ID` to town name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TownIdMap(BTreeMap<i64, String>);

impl TownIdMap {
    /// Returns the name of `town_id`, if mapped.
    #[must_use]
    pub fn name(&self, town_id: i64) -> Option<&str> {
        self.0.get(&town_id).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a mapping previously written by [`Self::save`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceUnavailable`] if the file is missing
    /// (usually because `town-boundaries` has not been run yet), or
    /// [`PipelineError::Json`] if it is malformed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::SourceUnavailable(format!(
                "town id mapping {}: {e} (run town-boundaries first)",
                path.display()
            ))
        })?;
        let map: Self = serde_json::from_str(&text)?;
        log::info!("Loaded {} town ids from {}", map.len(), path.display());
        Ok(map)
    }

    /// Writes the mapping as JSON, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        milton_maps_table::io::write_atomic(path, json.as_bytes())?;
        log::info!("Saved {} town ids to {}", self.len(), path.display());
        Ok(())
    }
}

impl FromIterator<(i64, String)> for TownIdMap {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
