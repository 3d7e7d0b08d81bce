//! MassDOT crash record ingestion.
//!
//! The crash portal exports a CSV with a short preamble above the header
//! row. Each record is turned into a point in the Massachusetts state plane
//! and kept only when it falls inside the selected town.

use std::io::{BufRead, BufReader, Read};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone};
use geo::{Geometry, Intersects, MultiPolygon, Point, Polygon};
use milton_maps_codes::crash::InjurySeverity;
use milton_maps_table::{Attributes, GeoRow, GeoTable};
use serde_json::Value;

use crate::PipelineError;
use crate::config::CrashConfig;

/// CRS of the crash coordinates.
pub const CRASH_CRS: &str = "EPSG:26986";

pub const X_COLUMN: &str = "X_Cooordinate";
pub const Y_COLUMN: &str = "Y_Cooordinate";
pub const DATE_COLUMN: &str = "Crash_Date";
pub const TIME_COLUMN: &str = "Crash_Time";
pub const REPORTED_SEVERITY_COLUMN: &str = "Maximum_Injury_Severity_Reported";

pub const DATETIME_COLUMN: &str = "CRASH_DATETIME";
pub const YEAR_COLUMN: &str = "YEAR";
pub const SEVERITY_COLUMN: &str = "SEVERITY";

/// Crash times are recorded in local time; they are tagged as EST.
const EST_OFFSET_SECONDS: i32 = 5 * 3600;

const DATETIME_FORMATS: &[&str] = &[
    "%d-%b-%Y %I:%M %p",
    "%d-%b-%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Output of [`ingest_crashes`].
#[derive(Debug, Clone, PartialEq)]
pub struct CrashIngest {
    /// Crashes inside the boundary, with point geometry.
    pub crashes: GeoTable,
    /// Records dropped for lack of coordinates.
    pub missing_coordinates: usize,
    /// Records dropped for falling outside the boundary.
    pub outside_boundary: usize,
}

/// Reads a crash CSV and keeps the records inside `boundary`.
///
/// # Errors
///
/// * [`PipelineError::SchemaMismatch`] if the coordinate columns are absent.
/// * [`PipelineError::Csv`] if the CSV is malformed.
/// * [`PipelineError::Io`] if the preamble cannot be read.
pub fn ingest_crashes<R: Read>(
    reader: R,
    boundary: &MultiPolygon<f64>,
    config: &CrashConfig,
) -> Result<CrashIngest, PipelineError> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    for _ in 0..config.skip_rows {
        line.clear();
        reader.read_line(&mut line).map_err(|e| PipelineError::Io {
            path: "crash CSV preamble".to_string(),
            source: e,
        })?;
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    for required in [X_COLUMN, Y_COLUMN] {
        if !headers.iter().any(|h| h == required) {
            return Err(PipelineError::schema(format!(
                "crash CSV has no {required} column"
            )));
        }
    }

    let mut rows = Vec::new();
    let mut total = 0_usize;
    let mut missing_coordinates = 0_usize;
    let mut outside_boundary = 0_usize;
    let mut unparsed_times = 0_usize;

    for record in csv_reader.records() {
        let record = record?;
        total += 1;

        let mut attributes: Attributes = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::from(cell)
                };
                (header.to_string(), value)
            })
            .collect();

        let coordinates = coordinate(&attributes, X_COLUMN).zip(coordinate(&attributes, Y_COLUMN));
        let Some((x, y)) = coordinates else {
            missing_coordinates += 1;
            continue;
        };

        let point = Point::new(x, y);
        if !boundary.intersects(&point) {
            outside_boundary += 1;
            continue;
        }

        attributes.insert(X_COLUMN.to_string(), Value::from(x));
        attributes.insert(Y_COLUMN.to_string(), Value::from(y));

        let datetime = crash_datetime(
            attributes.get(DATE_COLUMN).and_then(Value::as_str),
            attributes.get(TIME_COLUMN).and_then(Value::as_str),
        );
        if datetime.is_none() {
            unparsed_times += 1;
        }
        attributes.insert(
            DATETIME_COLUMN.to_string(),
            datetime.map_or(Value::Null, |dt| Value::from(dt.to_rfc3339())),
        );
        attributes.insert(
            YEAR_COLUMN.to_string(),
            datetime.map_or(Value::Null, |dt| Value::from(dt.year())),
        );

        let severity = InjurySeverity::from_reported(
            attributes
                .get(REPORTED_SEVERITY_COLUMN)
                .and_then(Value::as_str),
        );
        attributes.insert(
            SEVERITY_COLUMN.to_string(),
            severity.map_or(Value::Null, |s| Value::from(s.to_string())),
        );

        rows.push(GeoRow::new(attributes, Some(Geometry::Point(point))));
    }

    log::info!("Read {total} crash records");
    log::info!("Found {missing_coordinates} records missing coordinates, dropped");
    log::info!("Found {outside_boundary} records outside the town boundary, dropped");
    if unparsed_times > 0 {
        log::warn!("{unparsed_times} crash records have an unparseable date or time");
    }

    Ok(CrashIngest {
        crashes: GeoTable::new(Some(CRASH_CRS.to_string()), rows),
        missing_coordinates,
        outside_boundary,
    })
}

fn coordinate(attributes: &Attributes, column: &str) -> Option<f64> {
    match attributes.get(column)? {
        Value::String(s) => s.parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Combines the crash date and time and tags the result as EST.
///
/// The reported values are already local wall-clock times, so they are
/// tagged `-05:00` as they stand rather than read as UTC and shifted to EST.
/// Compared with a UTC reading, times come out five hours later and the
/// year can differ for crashes logged around midnight on New Year's Eve.
/// Daylight saving time is not applied.
fn crash_datetime(date: Option<&str>, time: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let text = format!("{} {}", date?.trim(), time?.trim());
    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())?;
    FixedOffset::west_opt(EST_OFFSET_SECONDS)?
        .from_local_datetime(&naive)
        .single()
}

/// Selects the boundary of the town named `name` (ASCII case-insensitive)
/// from a consolidated boundaries table.
///
/// # Errors
///
/// * [`PipelineError::DataIntegrity`] if no row has that name.
/// * [`PipelineError::SchemaMismatch`] if a matching row has no polygonal
///   geometry.
pub fn town_boundary(
    towns: &GeoTable,
    name: &str,
    name_column: &str,
) -> Result<MultiPolygon<f64>, PipelineError> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    let mut found = false;

    for town in towns
        .rows
        .iter()
        .filter(|row| row.get_str(name_column).is_some_and(|n| n.eq_ignore_ascii_case(name)))
    {
        found = true;
        match &town.geometry {
            Some(Geometry::Polygon(polygon)) => polygons.push(polygon.clone()),
            Some(Geometry::MultiPolygon(multi)) => polygons.extend(multi.0.iter().cloned()),
            _ => {
                return Err(PipelineError::schema(format!(
                    "boundary of {name} is not a polygon"
                )));
            }
        }
    }

    if !found {
        return Err(PipelineError::integrity(format!(
            "no town named {name} in the boundaries table"
        )));
    }

    Ok(MultiPolygon(polygons))
}
