//! Nested feed document -> flat [`FeatureRow`]s.
//!
//! Field access never fails: a missing key, a wrong JSON type or a
//! non-numeric string turns into a null cell and the pass continues.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{json_type, FeatureRow, RawApproachDocument};

/// Counters collected during one flattening pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlattenStats {
    pub dates: usize,
    pub objects: usize,
    pub rows: usize,
    pub hazardous_rows: usize,
    /// Present numeric fields that failed to coerce and became null.
    pub malformed_fields: usize,
    /// Non-object entries in a date's object list.
    pub skipped_objects: usize,
}

/// Parse a JSON number or numeric string. Anything else is `None`.
///
/// Non-finite values ("NaN", "inf") count as missing.
pub fn try_parse_float(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Truthiness of the hazard flag: `true`, non-zero numbers and non-empty
/// strings/collections are hazardous; `false`, `null` and absence are not.
fn hazard_flag(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

pub fn flatten(doc: &RawApproachDocument) -> Vec<FeatureRow> {
    flatten_with_stats(doc).0
}

pub fn flatten_with_stats(doc: &RawApproachDocument) -> (Vec<FeatureRow>, FlattenStats) {
    let mut rows = Vec::new();
    let mut stats = FlattenStats::default();

    for (date, objs) in doc.dates() {
        let Some(objs) = objs.as_array() else {
            debug!("skipping key {} ({} is not a list of objects)", date, json_type(objs));
            continue;
        };
        stats.dates += 1;

        for obj in objs {
            if !obj.is_object() {
                stats.skipped_objects += 1;
                continue;
            }
            stats.objects += 1;
            flatten_object(obj, &mut rows, &mut stats);
        }
    }

    stats.rows = rows.len();
    stats.hazardous_rows = rows.iter().filter(|r| r.is_hazardous == 1).count();
    if stats.malformed_fields > 0 {
        warn!(
            "{} numeric field(s) could not be parsed and were left empty",
            stats.malformed_fields
        );
    }
    (rows, stats)
}

fn flatten_object(obj: &Value, rows: &mut Vec<FeatureRow>, stats: &mut FlattenStats) {
    let is_hazardous = u8::from(hazard_flag(obj.get("is_potentially_hazardous_asteroid")));

    let mut numeric = |v: Option<&Value>| -> Option<f64> {
        let v = v?;
        let parsed = try_parse_float(v);
        if parsed.is_none() && !v.is_null() {
            stats.malformed_fields += 1;
        }
        parsed
    };

    let abs_mag = numeric(obj.get("absolute_magnitude_h"));
    let d_min = numeric(obj.pointer("/estimated_diameter/kilometers/estimated_diameter_min"));
    let d_max = numeric(obj.pointer("/estimated_diameter/kilometers/estimated_diameter_max"));

    let Some(approaches) = obj.get("close_approach_data").and_then(Value::as_array) else {
        return;
    };

    for ca in approaches {
        let rel_vel = numeric(ca.pointer("/relative_velocity/kilometers_per_second"));
        let miss_km = numeric(ca.pointer("/miss_distance/kilometers"));
        let approach_date = ca
            .get("close_approach_date")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_owned);

        rows.push(FeatureRow {
            approach_date,
            absolute_magnitude_h: abs_mag,
            diameter_km_min: d_min,
            diameter_km_max: d_max,
            rel_velocity_km_s: rel_vel,
            miss_distance_km: miss_km,
            is_hazardous,
        });
    }
}
