use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fs, path::Path};

use crate::error::DocumentError;

// ---------- Schema ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldDescriptor {
    FieldDescriptor { name, kind }
}

/// Canonical column order for every persisted table. Shared by the CSV writer
/// and reader.
pub const SCHEMA: [FieldDescriptor; 7] = [
    field("approach_date", FieldKind::Text),
    field("absolute_magnitude_h", FieldKind::Float),
    field("diameter_km_min", FieldKind::Float),
    field("diameter_km_max", FieldKind::Float),
    field("rel_velocity_km_s", FieldKind::Float),
    field("miss_distance_km", FieldKind::Float),
    field("is_hazardous", FieldKind::Label),
];

/// Model input order. Authoritative for the scaler and classifier weights.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "absolute_magnitude_h",
    "diameter_km_min",
    "diameter_km_max",
    "rel_velocity_km_s",
    "miss_distance_km",
];

pub const N_FEATURES: usize = 5;

pub const LABEL_NAME: &str = "is_hazardous";

// ---------- Rows ----------

/// One (object, close-approach) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub approach_date: Option<String>,
    pub absolute_magnitude_h: Option<f64>,
    pub diameter_km_min: Option<f64>,
    pub diameter_km_max: Option<f64>,
    pub rel_velocity_km_s: Option<f64>, // km/s
    pub miss_distance_km: Option<f64>,
    pub is_hazardous: u8, // 0 or 1, never null
}

impl FeatureRow {
    /// Feature values in [`FEATURE_NAMES`] order; `None` for each missing value.
    pub fn feature_slots(&self) -> [Option<f64>; N_FEATURES] {
        [
            self.absolute_magnitude_h,
            self.diameter_km_min,
            self.diameter_km_max,
            self.rel_velocity_km_s,
            self.miss_distance_km,
        ]
    }

    /// All five features, if none is null.
    pub fn features(&self) -> Option<[f64; N_FEATURES]> {
        let slots = self.feature_slots();
        let mut out = [0.0; N_FEATURES];
        for (dst, src) in out.iter_mut().zip(slots) {
            *dst = src?;
        }
        Some(out)
    }

    /// True when every field, the approach date included, is non-null.
    pub fn is_complete(&self) -> bool {
        self.approach_date.is_some() && self.features().is_some()
    }
}

// ---------- Raw document ----------

/// Date-keyed mapping of near-earth-object records, as deposited by the feed
/// fetcher. Field access is fail-soft, so the records stay untyped JSON.
#[derive(Debug, Clone, Default)]
pub struct RawApproachDocument {
    dates: Map<String, Value>,
}

impl RawApproachDocument {
    /// Accepts either the bare date mapping or a full feed response with a
    /// `near_earth_objects` wrapper.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let mut root = match value {
            Value::Object(root) => root,
            other => return Err(DocumentError::NotAnObject(json_type(&other))),
        };
        let dates = match root.remove("near_earth_objects") {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                // not the feed wrapper; keep the key as an ordinary entry
                root.insert("near_earth_objects".to_string(), other);
                root
            }
            None => root,
        };
        Ok(Self { dates })
    }

    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// (date, value) pairs in the document's iteration order.
    pub fn dates(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.dates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

pub(crate) fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
