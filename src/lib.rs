//! Near-earth-object hazard classifier.
//!
//! Flattens date-keyed close-approach documents into [`FeatureRow`]s and
//! trains a standardize + logistic-regression [`FittedPipeline`] that
//! predicts `is_hazardous`.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod flatten;
pub mod metrics;
pub mod model;
pub mod split;
pub mod table;
pub mod train;
pub mod types;

pub use artifacts::{write_artifacts, ArtifactPaths};
pub use config::TrainConfig;
pub use error::{ArtifactError, ConfigError, DocumentError, TableError, TrainError};
pub use flatten::{flatten, flatten_with_stats, try_parse_float, FlattenStats};
pub use metrics::{ClassificationReport, ConfusionMatrix, MetricsReport, TrainingWarning};
pub use model::{Convergence, FittedPipeline, LogisticRegression, StandardScaler, StopReason};
pub use train::train;
pub use types::{FeatureRow, RawApproachDocument, FEATURE_NAMES, SCHEMA};
