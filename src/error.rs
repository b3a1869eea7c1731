//! Error types for flattening, table I/O and training.

use std::path::PathBuf;
use thiserror::Error;

/// Raw document could not be turned into a [`RawApproachDocument`](crate::types::RawApproachDocument).
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// Top level is not a JSON object.
    #[error("document root must be an object keyed by date, found {0}")]
    NotAnObject(&'static str),
}

/// CSV table errors.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing column '{0}' in table header")]
    MissingColumn(&'static str),

    #[error("invalid is_hazardous value '{value}' on line {line}")]
    InvalidLabel { line: u64, value: String },
}

/// Pipeline artifact could not be written or read back.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode pipeline: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode pipeline: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("pipeline has the wrong shape: {0}")]
    Shape(String),

    #[error("failed to encode metrics report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Configuration file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Fatal training failures. Nothing is persisted when one of these is returned.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TrainError {
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }
}
