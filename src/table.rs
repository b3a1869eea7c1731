//! CSV persistence of [`FeatureRow`]s using the shared [`SCHEMA`].

use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
};

use crate::error::TableError;
use crate::types::{FeatureRow, SCHEMA};

fn fmt_float(v: Option<f64>) -> String {
    // Display is the shortest representation that parses back to the same f64
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn parse_float(cell: &str) -> Option<f64> {
    let v = cell.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

fn parse_label(cell: &str) -> Option<u8> {
    match cell.trim() {
        "0" | "false" | "False" => Some(0),
        "1" | "true" | "True" => Some(1),
        _ => None,
    }
}

pub fn write_rows<W: Write>(writer: W, rows: &[FeatureRow]) -> Result<(), TableError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(SCHEMA.iter().map(|f| f.name))?;
    for r in rows {
        w.write_record([
            r.approach_date.clone().unwrap_or_default(),
            fmt_float(r.absolute_magnitude_h),
            fmt_float(r.diameter_km_min),
            fmt_float(r.diameter_km_max),
            fmt_float(r.rel_velocity_km_s),
            fmt_float(r.miss_distance_km),
            r.is_hazardous.to_string(),
        ])?;
    }
    w.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write rows to `path`, creating parent directories as needed.
pub fn write_rows_to_path(path: impl AsRef<Path>, rows: &[FeatureRow]) -> Result<(), TableError> {
    let path = path.as_ref();
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    write_rows(file, rows)
}

/// Read rows back. Columns are located by header name, so extra or reordered
/// columns are tolerated. Blank or unparsable numeric cells become null.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<FeatureRow>, TableError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut idx = [0usize; SCHEMA.len()];
    for (slot, field) in idx.iter_mut().zip(SCHEMA.iter()) {
        *slot = headers
            .iter()
            .position(|h| h.trim() == field.name)
            .ok_or(TableError::MissingColumn(field.name))?;
    }
    let [date_i, mag_i, dmin_i, dmax_i, vel_i, miss_i, label_i] = idx;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("");

        let is_hazardous = parse_label(cell(label_i)).ok_or_else(|| TableError::InvalidLabel {
            line: record.position().map_or(0, |p| p.line()),
            value: cell(label_i).to_string(),
        })?;
        let date = cell(date_i).trim();

        rows.push(FeatureRow {
            approach_date: (!date.is_empty()).then(|| date.to_string()),
            absolute_magnitude_h: parse_float(cell(mag_i)),
            diameter_km_min: parse_float(cell(dmin_i)),
            diameter_km_max: parse_float(cell(dmax_i)),
            rel_velocity_km_s: parse_float(cell(vel_i)),
            miss_distance_km: parse_float(cell(miss_i)),
            is_hazardous,
        });
    }
    Ok(rows)
}

pub fn read_rows_from_path(path: impl AsRef<Path>) -> Result<Vec<FeatureRow>, TableError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_rows(file)
}
