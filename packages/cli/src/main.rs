#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the milton maps pipeline.
//!
//! One subcommand per stage. Stages that depend on each other communicate
//! through files: `town-boundaries` writes the town-id mapping that
//! `assessor-db` reads, and `crashes` reads the consolidated boundaries.
//!
//! Uses `indicatif-log-bridge` (via [`milton_maps_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and stage spinners never fight for the terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use milton_maps_pipeline::config::PipelineConfig;

/// Process MassGIS town, assessor, open space, parcel and crash data.
#[derive(Parser)]
#[command(name = "milton_maps")]
#[command(about = "Process MassGIS town, assessor, open space, parcel and crash data")]
struct Cli {
    /// TOML configuration file overriding the built-in defaults.
    #[arg(long, global = true, env = "MILTON_MAPS_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Pipeline stages.
#[derive(Subcommand)]
enum Commands {
    /// Merge town survey fragments into one boundary per town.
    TownBoundaries {
        /// Town survey polygons (`.shp` or `.geojson`).
        input: PathBuf,
        /// Output path; `.geojson.zip` is appended unless the extension is
        /// already a writable format.
        output: PathBuf,
        /// Where to write the town-id mapping (default from config).
        #[arg(long)]
        town_ids: Option<PathBuf>,
    },

    /// Normalize one town's assessor table from a parcel geodatabase.
    AssessorDb {
        /// Parcel geodatabase (`.gdb`) or `GeoJSON` export.
        input: PathBuf,
        /// Assessor layer within the geodatabase, e.g. `M189Assess`.
        layer: String,
        /// Output path; `.msgpack` is appended unless the extension is
        /// already a writable format.
        output: PathBuf,
        /// Town-id mapping written by `town-boundaries` (default from
        /// config).
        #[arg(long)]
        town_ids: Option<PathBuf>,
    },

    /// Label open space access, protection and purpose codes.
    OpenSpace {
        /// Open space polygons (`.shp` or `.geojson`).
        input: PathBuf,
        /// Output path; `.geojson.zip` is appended unless the extension is
        /// already a writable format.
        output: PathBuf,
    },

    /// Join tax parcel shapes with normalized assessor records and keep the
    /// residential parcels.
    TaxParcels {
        /// Tax parcel layers, one per town.
        #[arg(long = "parcels", required = true, num_args = 1..)]
        parcels: Vec<PathBuf>,
        /// Normalized assessor tables, in the same town order as
        /// `--parcels`.
        #[arg(long = "assessor", required = true, num_args = 1..)]
        assessors: Vec<PathBuf>,
        /// Output path; `.msgpack` is appended unless the extension is
        /// already a writable format.
        output: PathBuf,
    },

    /// Load MassDOT crash records inside one town.
    Crashes {
        /// Crash details CSV export.
        input: PathBuf,
        /// Consolidated town boundaries written by `town-boundaries`.
        #[arg(long)]
        boundaries: PathBuf,
        /// Town name (e.g. `MILTON`) or MassGIS town id (e.g. `189`), which
        /// is looked up in the town-id mapping.
        #[arg(long)]
        town: String,
        /// Output path; `.geojson.zip` is appended unless the extension is
        /// already a writable format.
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = milton_maps_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::TownBoundaries {
            input,
            output,
            town_ids,
        } => commands::town_boundaries(&multi, &config, &input, &output, town_ids.as_deref())?,
        Commands::AssessorDb {
            input,
            layer,
            output,
            town_ids,
        } => commands::assessor_db(
            &multi,
            &config,
            &input,
            &layer,
            &output,
            town_ids.as_deref(),
        )?,
        Commands::OpenSpace { input, output } => {
            commands::open_space(&multi, &config, &input, &output)?;
        }
        Commands::TaxParcels {
            parcels,
            assessors,
            output,
        } => commands::tax_parcels(&multi, &config, &parcels, &assessors, &output)?,
        Commands::Crashes {
            input,
            boundaries,
            town,
            output,
        } => commands::crashes(&multi, &config, &input, &boundaries, &town, &output)?,
    }

    Ok(())
}
