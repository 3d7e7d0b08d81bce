//! Pipeline configuration.
//!
//! Configuration is TOML. The defaults are embedded at compile time from
//! `config/default.toml`; a user file only needs the keys it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Embedded default configuration.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// CRS assigned to sources whose format does not record one.
    pub default_crs: String,
    /// Where `town-boundaries` writes and `assessor-db` reads the town-id
    /// mapping.
    pub town_ids_path: PathBuf,
    /// Boundary consolidation settings.
    pub boundaries: BoundaryConfig,
    /// Crash ingestion settings.
    pub crashes: CrashConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_crs: "EPSG:26986".to_string(),
            town_ids_path: PathBuf::from("data/processed/town_ids.json"),
            boundaries: BoundaryConfig::default(),
            crashes: CrashConfig::default(),
        }
    }
}

/// Column names and validation thresholds for boundary consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Integer town identifier shared by all fragments of a town.
    pub town_id_column: String,
    /// Town name; must be invariant within each town.
    pub town_name_column: String,
    /// Per-fragment area in the source, and the derived area column.
    pub area_column: String,
    /// Number of towns the survey must contain.
    pub expected_town_count: usize,
    /// Number of columns in the consolidated table, counting the geometry
    /// and excluding the town-id key.
    pub expected_column_count: usize,
    /// Maximum relative difference between a town's merged area and the
    /// sum of its fragment areas.
    pub area_tolerance: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            town_id_column: "TOWN_ID".to_string(),
            town_name_column: "TOWN".to_string(),
            area_column: "SHAPE_AREA".to_string(),
            expected_town_count: milton_maps_codes::towns::MASSACHUSETTS_TOWN_COUNT,
            expected_column_count: 19,
            area_tolerance: 1e-9,
        }
    }
}

/// Crash CSV settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Preamble lines before the CSV header row.
    pub skip_rows: usize,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self { skip_rows: 2 }
    }
}

impl PipelineConfig {
    /// Parses a TOML configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        toml::de::from_str(toml_str).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })
    }

    /// Loads configuration from `path`, or the embedded defaults when
    /// `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceUnavailable`] if the file cannot be
    /// read, or [`PipelineError::Config`] if it is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let Some(path) = path else {
            return Self::from_toml(DEFAULT_CONFIG_TOML);
        };

        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
