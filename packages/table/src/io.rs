//! Reading and writing tables by path.
//!
//! The format is chosen from the path's extension (see [`FileFormat`]).
//! Writes go to a hidden temporary file next to the destination and are
//! renamed into place, so a failed write never leaves a partial file where
//! a later stage would pick it up.

use std::path::{Path, PathBuf};

use crate::{FileFormat, GeoTable, TableError, archive, geojson_io, msgpack, spatial_read};

/// Options for [`read_table`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions<'a> {
    /// Layer within a multi-layer source (file geodatabases).
    pub layer: Option<&'a str>,
    /// CRS to tag the table with when the format does not carry one.
    pub default_crs: Option<&'a str>,
}

/// Reads a table from `path`.
///
/// # Errors
///
/// * [`TableError::SourceUnavailable`] if `path` does not exist.
/// * [`TableError::UnsupportedFormat`] if the extension is not recognized.
/// * [`TableError::LayerNotFound`] if the requested layer is missing.
/// * Any decoding error of the underlying format.
pub fn read_table(path: &Path, options: ReadOptions<'_>) -> Result<GeoTable, TableError> {
    if !path.exists() {
        return Err(TableError::SourceUnavailable(path.display().to_string()));
    }

    let format = FileFormat::from_path(path)
        .ok_or_else(|| TableError::UnsupportedFormat(path.display().to_string()))?;

    log::debug!("Reading {format} table from {}", path.display());

    let mut table = match format {
        FileFormat::GeoJson => geojson_io::parse(&read_to_string(path)?)?,
        FileFormat::GeoJsonZip => archive::read(path)?,
        FileFormat::MessagePack => msgpack::decode(&read_bytes(path)?)?,
        FileFormat::Shapefile | FileFormat::FileGeodatabase => {
            spatial_read::read(path, options.layer, options.default_crs)?
        }
    };

    if table.crs.is_none() {
        table.crs = options.default_crs.map(ToString::to_string);
    }

    Ok(table)
}

/// Writes `table` to `path` atomically.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// * [`TableError::UnsupportedFormat`] if the extension is not recognized.
/// * [`TableError::ReadOnlyFormat`] for formats that can only be read.
/// * [`TableError::Io`] if the file cannot be written or renamed.
pub fn write_table(table: &GeoTable, path: &Path) -> Result<u64, TableError> {
    let format = FileFormat::from_path(path)
        .ok_or_else(|| TableError::UnsupportedFormat(path.display().to_string()))?;

    let bytes = match format {
        FileFormat::GeoJson => geojson_io::to_string(table)?.into_bytes(),
        FileFormat::GeoJsonZip => archive::encode(table, path)?,
        FileFormat::MessagePack => msgpack::encode(table)?,
        FileFormat::Shapefile | FileFormat::FileGeodatabase => {
            return Err(TableError::ReadOnlyFormat {
                format,
                path: path.display().to_string(),
            });
        }
    };

    write_atomic(path, &bytes)?;

    log::info!(
        "Wrote {} rows to {} ({format}, {} bytes)",
        table.len(),
        path.display(),
        bytes.len()
    );

    Ok(bytes.len() as u64)
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it into
/// place. Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`TableError::Io`] if any filesystem step fails. The temporary
/// file is removed on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TableError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TableError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let tmp_path = temp_path(path);

    let result = std::fs::write(&tmp_path, bytes)
        .and_then(|()| std::fs::rename(&tmp_path, path))
        .map_err(|e| TableError::Io {
            path: path.display().to_string(),
            source: e,
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }

    result
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{file_name}.tmp"))
}

fn read_to_string(path: &Path) -> Result<String, TableError> {
    std::fs::read_to_string(path).map_err(|e| TableError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, TableError> {
    std::fs::read(path).map_err(|e| TableError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
