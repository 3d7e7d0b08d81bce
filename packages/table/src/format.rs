//! File formats recognized by extension.

use std::path::{Path, PathBuf};

use strum_macros::{AsRefStr, Display};

/// A table file format, selected from the path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum FileFormat {
    /// `GeoJSON` `FeatureCollection` (`.geojson`, `.json`).
    #[strum(serialize = "GeoJSON")]
    GeoJson,
    /// Deflate-compressed zip archive holding one `GeoJSON` file
    /// (`.geojson.zip`).
    #[strum(serialize = "zipped GeoJSON")]
    GeoJsonZip,
    /// `MessagePack`-serialized table (`.msgpack`).
    #[strum(serialize = "MessagePack")]
    MessagePack,
    /// ESRI shapefile (`.shp`), read through `DuckDB` spatial.
    #[strum(serialize = "ESRI Shapefile")]
    Shapefile,
    /// ESRI file geodatabase directory (`.gdb`), read through `DuckDB`
    /// spatial.
    #[strum(serialize = "File Geodatabase")]
    FileGeodatabase,
}

impl FileFormat {
    /// Detects the format of `path` from its (case-insensitive) extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        let name = name.trim_end_matches(['/', '\\']);

        if name.ends_with(".geojson.zip") {
            Some(Self::GeoJsonZip)
        } else if name.ends_with(".geojson") || name.ends_with(".json") {
            Some(Self::GeoJson)
        } else if name.ends_with(".msgpack") {
            Some(Self::MessagePack)
        } else if name.ends_with(".shp") {
            Some(Self::Shapefile)
        } else if name.ends_with(".gdb") {
            Some(Self::FileGeodatabase)
        } else {
            None
        }
    }

    /// Canonical extension, without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::GeoJsonZip => "geojson.zip",
            Self::MessagePack => "msgpack",
            Self::Shapefile => "shp",
            Self::FileGeodatabase => "gdb",
        }
    }

    /// Whether tables can be written in this format.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::GeoJson | Self::GeoJsonZip | Self::MessagePack)
    }

    /// Returns `path` unchanged if it already has this format's extension,
    /// otherwise appends the extension.
    #[must_use]
    pub fn ensure_extension(self, path: &Path) -> PathBuf {
        if Self::from_path(path) == Some(self) {
            return path.to_path_buf();
        }
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(self.extension());
        PathBuf::from(name)
    }
}
