//! CSV ingest and normalization.
//!
//! This module turns an observations CSV into a validated `Sample`.
//!
//! Accepted layouts (header names are case-insensitive):
//! - `t,theta,phi`: colatitude/azimuth, radians (or degrees with `--degrees`)
//! - `t,x,y,z`: Cartesian components, renormalized to unit length
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Separation of concerns**: no fitting logic here

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Direction, Sample};
use crate::error::AppError;

/// Which coordinate columns the file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordLayout {
    Spherical { degrees: bool },
    Cartesian,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the validated sample + layout + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub sample: Sample,
    pub layout: CoordLayout,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load an observations CSV from disk.
pub fn load_sample(path: &Path, degrees: bool) -> Result<IngestedData, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display()))
    })?;
    read_sample(file, degrees)
}

/// Parse an observations CSV from any reader.
pub fn read_sample<R: Read>(input: R, degrees: bool) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let layout = resolve_layout(&header_map, degrees)?;

    let mut t = Vec::new();
    let mut y = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map, layout));
        match parsed {
            Ok((ti, yi)) => {
                t.push(ti);
                y.push(yi);
            }
            Err(message) => {
                log::warn!("skipping CSV line {line}: {message}");
                row_errors.push(RowError { line, message });
            }
        }
    }

    let rows_used = t.len();
    if rows_used == 0 {
        return Err(AppError::new(3, "No valid rows remain after parsing."));
    }
    let sample = Sample::new(t, y)?;
    log::info!("ingested {rows_used} of {rows_read} rows ({layout:?})");

    Ok(IngestedData {
        sample,
        layout,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_layout(header_map: &HashMap<String, usize>, degrees: bool) -> Result<CoordLayout, AppError> {
    if !header_map.contains_key("t") {
        return Err(AppError::new(2, "Missing required column: `t`"));
    }
    let has = |names: &[&str]| names.iter().all(|n| header_map.contains_key(*n));

    if has(&["theta", "phi"]) {
        return Ok(CoordLayout::Spherical { degrees });
    }
    if has(&["x", "y", "z"]) {
        if degrees {
            log::warn!("`--degrees` has no effect on Cartesian x,y,z columns");
        }
        return Ok(CoordLayout::Cartesian);
    }
    Err(AppError::new(
        2,
        "Missing coordinate columns: expected `theta,phi` or `x,y,z`.",
    ))
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    layout: CoordLayout,
) -> Result<(f64, Direction), String> {
    let t = get_f64(record, header_map, "t")?;
    let direction = match layout {
        CoordLayout::Spherical { degrees } => {
            let mut theta = get_f64(record, header_map, "theta")?;
            let mut phi = get_f64(record, header_map, "phi")?;
            if degrees {
                theta = theta.to_radians();
                phi = phi.to_radians();
            }
            Direction::from_spherical(theta, phi)
        }
        CoordLayout::Cartesian => Direction::from_xyz(
            get_f64(record, header_map, "x")?,
            get_f64(record, header_map, "y")?,
            get_f64(record, header_map, "z")?,
        ),
    }
    .map_err(|e| e.to_string())?;
    Ok((t, direction))
}

fn get_f64(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<f64, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    let raw = record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))?;
    let v = raw
        .parse::<f64>()
        .map_err(|_| format!("Invalid number for `{name}`: '{raw}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value for `{name}`"))
    }
}
