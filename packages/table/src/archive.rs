//! Zip archive packaging for `GeoJSON` tables.
//!
//! The archive holds a single `.geojson` entry named after the archive
//! itself (`towns.geojson.zip` -> `towns.geojson`). On read, the first
//! `.geojson`/`.json` entry is used regardless of its name.

use std::io::{Cursor, Read as _, Write as _};
use std::path::Path;

use crate::{GeoTable, TableError, geojson_io};

/// Encodes a table as a Deflate-compressed zip archive.
pub fn encode(table: &GeoTable, archive_path: &Path) -> Result<Vec<u8>, TableError> {
    let entry_name = entry_name(archive_path);
    let text = geojson_io::to_string(table)?;

    let mut zip_writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip_writer.start_file(entry_name.as_str(), options)?;
    zip_writer
        .write_all(text.as_bytes())
        .map_err(|e| TableError::Io {
            path: archive_path.display().to_string(),
            source: e,
        })?;

    Ok(zip_writer.finish()?.into_inner())
}

/// Decodes the first `GeoJSON` entry of a zip archive.
pub fn read(archive_path: &Path) -> Result<GeoTable, TableError> {
    let file = std::fs::File::open(archive_path).map_err(|e| TableError::Io {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_ascii_lowercase();
        if !(name.ends_with(".geojson") || name.ends_with(".json")) {
            continue;
        }

        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| TableError::Io {
                path: format!("{}:{}", archive_path.display(), entry.name()),
                source: e,
            })?;
        return geojson_io::parse(&text);
    }

    Err(TableError::LayerNotFound {
        path: archive_path.display().to_string(),
        layer: "*.geojson".to_string(),
    })
}

fn entry_name(archive_path: &Path) -> String {
    let file_name = archive_path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());

    let stem = file_name
        .strip_suffix(".zip")
        .or_else(|| file_name.strip_suffix(".ZIP"))
        .unwrap_or(&file_name);

    if stem.to_ascii_lowercase().ends_with(".geojson") {
        stem.to_string()
    } else if stem.is_empty() {
        "table.geojson".to_string()
    } else {
        format!("{stem}.geojson")
    }
}
