#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static code tables for Massachusetts GIS datasets.
//!
//! MassGIS publishes most categorical fields as short codes. These modules
//! translate them into the human-readable labels used by the processing
//! pipelines. The tables are leaves: nothing here depends on any other
//! crate in the workspace.

pub mod crash;
pub mod land_use;
pub mod open_space;
pub mod towns;
