//! Subcommand implementations.
//!
//! Each command validates its paths, reads its inputs, runs one pipeline
//! stage under a [`StageSpinner`], and writes the result atomically.

use std::fs::File;
use std::path::{Path, PathBuf};

use milton_maps_cli_utils::{MultiProgress, StageSpinner};
use milton_maps_pipeline::config::PipelineConfig;
use milton_maps_pipeline::town_ids::TownIdMap;
use milton_maps_pipeline::{PipelineError, assessor, boundaries, crashes, open_space, parcels};
use milton_maps_table::io::{ReadOptions, read_table, write_table};
use milton_maps_table::{FileFormat, GeoTable, log_table_summary};

/// Runs `stage` under a spinner, clearing it if the stage fails.
fn run_stage<T>(
    multi: &MultiProgress,
    message: &str,
    stage: impl FnOnce(&StageSpinner) -> Result<(T, String), PipelineError>,
) -> Result<T, PipelineError> {
    let spinner = StageSpinner::start(multi, message);
    match stage(&spinner) {
        Ok((value, done)) => {
            spinner.finish(&done);
            Ok(value)
        }
        Err(e) => {
            spinner.finish_and_clear();
            log::error!("{message} failed ({}): {e}", e.kind());
            Err(e)
        }
    }
}

/// Checks that `path` has one of the `allowed` formats.
fn require_input(path: &Path, allowed: &[FileFormat]) -> Result<FileFormat, PipelineError> {
    FileFormat::from_path(path)
        .filter(|format| allowed.contains(format))
        .ok_or_else(|| PipelineError::Config {
            message: format!(
                "input must be one of {}, got {}",
                allowed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                path.display()
            ),
        })
}

/// Keeps `path` when it already names a writable format, otherwise appends
/// the extension of `default`.
fn output_path(path: &Path, default: FileFormat) -> PathBuf {
    match FileFormat::from_path(path) {
        Some(format) if format.is_writable() => path.to_path_buf(),
        _ => default.ensure_extension(path),
    }
}

fn read(
    path: &Path,
    config: &PipelineConfig,
    layer: Option<&str>,
) -> Result<GeoTable, PipelineError> {
    let table = read_table(
        path,
        ReadOptions {
            layer,
            default_crs: Some(&config.default_crs),
        },
    )?;
    log_table_summary(&path.display().to_string(), &table);
    Ok(table)
}

/// Resolves `--town` given as a name or a MassGIS town id.
///
/// Ids are looked up in the mapping written by `town-boundaries`; names are
/// used as given.
fn resolve_town(town: &str, town_ids_path: &Path) -> Result<String, PipelineError> {
    let town = town.trim();
    let Ok(id) = town.parse::<i64>() else {
        return Ok(town.to_string());
    };

    let town_ids = TownIdMap::load(town_ids_path)?;
    town_ids
        .name(id)
        .map(ToString::to_string)
        .ok_or_else(|| PipelineError::Config {
            message: format!("unknown town id {id}; pass the town name instead"),
        })
}

pub fn town_boundaries(
    multi: &MultiProgress,
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    town_ids_path: Option<&Path>,
) -> Result<(), PipelineError> {
    require_input(
        input,
        &[FileFormat::Shapefile, FileFormat::GeoJson, FileFormat::GeoJsonZip],
    )?;
    let output = output_path(output, FileFormat::GeoJsonZip);
    let town_ids_path = town_ids_path.unwrap_or(&config.town_ids_path);

    run_stage(multi, "Consolidating town boundaries", |spinner| {
        let fragments = read(input, config, None)?;

        spinner.set_message("Merging fragments");
        let result = boundaries::consolidate(&fragments, &config.boundaries)?;

        spinner.set_message("Writing town boundaries");
        write_table(&result.towns, &output)?;
        if let Err(e) = result.town_ids.save(town_ids_path) {
            // the boundaries are only usable together with their town ids
            let _ = std::fs::remove_file(&output);
            return Err(e);
        }

        Ok((
            (),
            format!(
                "Consolidated {} towns into {}",
                result.towns.len(),
                output.display()
            ),
        ))
    })
}

pub fn assessor_db(
    multi: &MultiProgress,
    config: &PipelineConfig,
    input: &Path,
    layer: &str,
    output: &Path,
    town_ids_path: Option<&Path>,
) -> Result<(), PipelineError> {
    require_input(input, &[FileFormat::FileGeodatabase, FileFormat::GeoJson])?;
    let output = output_path(output, FileFormat::MessagePack);
    let town_ids = TownIdMap::load(town_ids_path.unwrap_or(&config.town_ids_path))?;

    run_stage(multi, &format!("Normalizing assessor layer {layer}"), |spinner| {
        let raw = read(input, config, Some(layer))?;

        spinner.set_message("Deriving parcel ids and labels");
        let normalized = assessor::normalize_assessor(raw, &town_ids)?;

        spinner.set_message("Writing assessor records");
        write_table(&normalized, &output)?;

        Ok((
            (),
            format!(
                "Normalized {} assessor records into {}",
                normalized.len(),
                output.display()
            ),
        ))
    })
}

pub fn open_space(
    multi: &MultiProgress,
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
) -> Result<(), PipelineError> {
    require_input(
        input,
        &[FileFormat::Shapefile, FileFormat::GeoJson, FileFormat::GeoJsonZip],
    )?;
    let output = output_path(output, FileFormat::GeoJsonZip);

    run_stage(multi, "Normalizing open space", |spinner| {
        let raw = read(input, config, None)?;
        let normalized = open_space::normalize_open_space(raw);

        spinner.set_message("Writing open space");
        write_table(&normalized, &output)?;

        Ok((
            (),
            format!(
                "Normalized {} open space records into {}",
                normalized.len(),
                output.display()
            ),
        ))
    })
}

pub fn tax_parcels(
    multi: &MultiProgress,
    config: &PipelineConfig,
    parcel_paths: &[PathBuf],
    assessor_paths: &[PathBuf],
    output: &Path,
) -> Result<(), PipelineError> {
    let output = output_path(output, FileFormat::MessagePack);

    run_stage(multi, "Joining tax parcels", |spinner| {
        let parcels = parcel_paths
            .iter()
            .map(|path| read(path, config, None))
            .collect::<Result<Vec<_>, _>>()?;
        let assessors = assessor_paths
            .iter()
            .map(|path| read(path, config, None))
            .collect::<Result<Vec<_>, _>>()?;

        spinner.set_message("Joining parcels with assessor records");
        let join = parcels::join_residential(parcels, assessors)?;

        spinner.set_message("Writing residential parcels");
        write_table(&join.residential, &output)?;

        Ok((
            (),
            format!(
                "Wrote {} residential parcels to {} ({} matched, {} without assessor record, {} without shape)",
                join.residential.len(),
                output.display(),
                join.stats.matched,
                join.stats.parcels_only,
                join.stats.assessor_only,
            ),
        ))
    })
}

pub fn crashes(
    multi: &MultiProgress,
    config: &PipelineConfig,
    input: &Path,
    boundaries_path: &Path,
    town: &str,
    output: &Path,
) -> Result<(), PipelineError> {
    let town = resolve_town(town, &config.town_ids_path)?;
    let output = output_path(output, FileFormat::GeoJsonZip);

    run_stage(multi, &format!("Loading crashes in {town}"), |spinner| {
        let towns = read(boundaries_path, config, None)?;
        let boundary =
            crashes::town_boundary(&towns, &town, &config.boundaries.town_name_column)?;

        let file = File::open(input)
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {e}", input.display())))?;

        spinner.set_message("Reading crash records");
        let ingest = crashes::ingest_crashes(file, &boundary, &config.crashes)?;

        spinner.set_message("Writing crashes");
        write_table(&ingest.crashes, &output)?;

        Ok((
            (),
            format!(
                "Wrote {} crashes to {} ({} without coordinates, {} outside {town})",
                ingest.crashes.len(),
                output.display(),
                ingest.missing_coordinates,
                ingest.outside_boundary,
            ),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Rect, coord};
    use milton_maps_cli_utils::ProgressDrawTarget;
    use milton_maps_pipeline::ErrorKind;
    use milton_maps_pipeline::config::BoundaryConfig;
    use milton_maps_table::GeoRow;

    fn hidden_multi() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn square(x: f64, size: f64) -> Geometry<f64> {
        Rect::new(coord! { x: x, y: 0.0 }, coord! { x: x + size, y: size })
            .to_polygon()
            .into()
    }

    #[test]
    fn output_path_appends_default_extension() {
        assert_eq!(
            output_path(Path::new("out/towns"), FileFormat::GeoJsonZip),
            PathBuf::from("out/towns.geojson.zip")
        );
        assert_eq!(
            output_path(Path::new("out/towns.geojson"), FileFormat::GeoJsonZip),
            PathBuf::from("out/towns.geojson")
        );
        assert_eq!(
            output_path(Path::new("out/assess.shp"), FileFormat::MessagePack),
            PathBuf::from("out/assess.shp.msgpack")
        );
    }

    #[test]
    fn require_input_rejects_other_formats() {
        let err = require_input(Path::new("assess.msgpack"), &[FileFormat::FileGeodatabase])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            require_input(Path::new("M189.gdb"), &[FileFormat::FileGeodatabase]).unwrap(),
            FileFormat::FileGeodatabase
        );
    }

    #[test]
    fn resolves_town_ids_and_names() {
        let tmp = std::env::temp_dir().join("milton_maps_cli_resolve_town_test");
        let _ = std::fs::remove_dir_all(&tmp);
        let town_ids_path = tmp.join("town_ids.json");

        // names never need the mapping
        assert_eq!(resolve_town(" QUINCY ", &town_ids_path).unwrap(), "QUINCY");
        assert_eq!(
            resolve_town("189", &town_ids_path).unwrap_err().kind(),
            ErrorKind::SourceUnavailable
        );

        let town_ids: TownIdMap = [(189, "MILTON".to_string()), (351, "WORCESTER".to_string())]
            .into_iter()
            .collect();
        town_ids.save(&town_ids_path).unwrap();

        assert_eq!(resolve_town("189", &town_ids_path).unwrap(), "MILTON");
        assert_eq!(resolve_town("351", &town_ids_path).unwrap(), "WORCESTER");
        assert_eq!(
            resolve_town("999", &town_ids_path).unwrap_err().kind(),
            ErrorKind::Configuration
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn town_boundaries_leaves_no_output_when_town_ids_fail() {
        let tmp = std::env::temp_dir().join("milton_maps_cli_town_ids_failure_test");
        let _ = std::fs::remove_dir_all(&tmp);

        // a directory where the town-id file should go makes the save fail
        let town_ids_path = tmp.join("town_ids.json");
        std::fs::create_dir_all(town_ids_path.join("occupied")).unwrap();

        let config = PipelineConfig {
            town_ids_path: town_ids_path.clone(),
            boundaries: BoundaryConfig {
                expected_town_count: 1,
                expected_column_count: 5,
                ..BoundaryConfig::default()
            },
            ..PipelineConfig::default()
        };

        let mut fragment = GeoRow::default();
        fragment.set("TOWN_ID", 189);
        fragment.set("TOWN", "MILTON");
        fragment.set("SHAPE_AREA", 100.0);
        fragment.geometry = Some(square(0.0, 10.0));
        let survey = tmp.join("TOWNSSURVEY_POLYM.geojson");
        write_table(&GeoTable::new(None, vec![fragment]), &survey).unwrap();

        let output = tmp.join("towns.geojson.zip");
        let result = town_boundaries(&hidden_multi(), &config, &survey, &output, None);

        assert!(result.is_err());
        assert!(!output.exists());
        assert!(town_ids_path.is_dir());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn runs_stages_end_to_end() {
        let tmp = std::env::temp_dir().join("milton_maps_cli_end_to_end_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let config = PipelineConfig {
            town_ids_path: tmp.join("processed").join("town_ids.json"),
            boundaries: BoundaryConfig {
                expected_town_count: 2,
                expected_column_count: 5,
                ..BoundaryConfig::default()
            },
            ..PipelineConfig::default()
        };
        let multi = hidden_multi();

        // town survey: MILTON in two fragments, QUINCY in one
        let mut fragments = Vec::new();
        let survey_fragments = [
            (189, "MILTON", 0.0),
            (189, "MILTON", 200.0),
            (243, "QUINCY", 400.0),
        ];
        for (town_id, name, x) in survey_fragments {
            let mut row = GeoRow::default();
            row.set("TOWN_ID", town_id);
            row.set("TOWN", name);
            row.set("SHAPE_AREA", 10_000.0);
            row.geometry = Some(square(x, 100.0));
            fragments.push(row);
        }
        let survey = tmp.join("raw").join("TOWNSSURVEY_POLYM.geojson");
        write_table(&GeoTable::new(None, fragments), &survey).unwrap();

        town_boundaries(&multi, &config, &survey, &tmp.join("processed").join("towns"), None)
            .unwrap();
        let towns_path = tmp.join("processed").join("towns.geojson.zip");
        let towns = read_table(&towns_path, ReadOptions::default()).unwrap();
        assert_eq!(towns.len(), 2);
        assert_eq!(towns.crs.as_deref(), Some("EPSG:26986"));

        // assessor records for Milton
        let mut single_family = GeoRow::default();
        single_family.set("TOWN_ID", 189);
        single_family.set("PROP_ID", "00123");
        single_family.set("USE_CODE", "1010");
        single_family.set("SITE_ADDR", "1  CANTON   AVE");
        let mut office = GeoRow::default();
        office.set("LOC_ID", "F_2");
        office.set("TOWN_ID", 189);
        office.set("USE_CODE", "340");
        let assess_raw = tmp.join("raw").join("M189Assess.geojson");
        write_table(&GeoTable::new(None, vec![single_family, office]), &assess_raw).unwrap();

        let assess_out = tmp.join("processed").join("m189_assess");
        assessor_db(&multi, &config, &assess_raw, "M189Assess", &assess_out, None).unwrap();
        let assess_path = tmp.join("processed").join("m189_assess.msgpack");
        let assess = read_table(&assess_path, ReadOptions::default()).unwrap();
        assert_eq!(assess.rows[0].get_str("TOWN"), Some("MILTON"));

        // parcel shapes
        let mut shapes = Vec::new();
        for (loc_id, x) in [("18900123", 0.0), ("F_2", 20.0)] {
            let mut row = GeoRow::default();
            row.set("LOC_ID", loc_id);
            row.geometry = Some(square(x, 10.0));
            shapes.push(row);
        }
        let parcels_path = tmp.join("raw").join("M189TaxPar.geojson");
        write_table(&GeoTable::new(None, shapes), &parcels_path).unwrap();

        let residential_out = tmp.join("processed").join("residential");
        tax_parcels(
            &multi,
            &config,
            &[parcels_path],
            &[assess_path],
            &residential_out,
        )
        .unwrap();
        let residential = read_table(
            &tmp.join("processed").join("residential.msgpack"),
            ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(residential.len(), 1);
        assert_eq!(residential.rows[0].get_str("SITE_ADDR"), Some("1 CANTON AVE"));
        assert!(residential.rows[0].geometry.is_some());

        // crashes clipped to Milton
        let crash_csv = tmp.join("raw").join("MiltonCrashDetails.csv");
        std::fs::write(
            &crash_csv,
            "Report\nMilton\nCrash_Number,Crash_Date,Crash_Time,Maximum_Injury_Severity_Reported,X_Cooordinate,Y_Cooordinate\n\
             1,01-Jan-2020,05:30 PM,No injury,50,50\n\
             2,01-Jan-2020,06:30 PM,No injury,450,50\n",
        )
        .unwrap();
        crashes(
            &multi,
            &config,
            &crash_csv,
            &towns_path,
            "189",
            &tmp.join("processed").join("crashes.geojson"),
        )
        .unwrap();
        let crash_table = read_table(
            &tmp.join("processed").join("crashes.geojson"),
            ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(crash_table.len(), 1);
        assert_eq!(crash_table.rows[0].get_str("SEVERITY"), Some("No Injury"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assessor_db_requires_town_ids() {
        let tmp = std::env::temp_dir().join("milton_maps_cli_missing_ids_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let config = PipelineConfig {
            town_ids_path: tmp.join("town_ids.json"),
            ..PipelineConfig::default()
        };
        let err = assessor_db(
            &hidden_multi(),
            &config,
            &tmp.join("M189.gdb"),
            "M189Assess",
            &tmp.join("out"),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }
}
