//! Persisting a finished run: the pipeline blob plus `metrics.txt` and
//! `metrics.json` next to it.

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::ArtifactError;
use crate::metrics::MetricsReport;
use crate::model::FittedPipeline;

pub const METRICS_TEXT: &str = "metrics.txt";
pub const METRICS_JSON: &str = "metrics.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub metrics_text: PathBuf,
    pub metrics_json: PathBuf,
}

impl ArtifactPaths {
    pub fn for_model(model: impl AsRef<Path>) -> Self {
        let model = model.as_ref().to_path_buf();
        let dir = model.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            metrics_text: dir.join(METRICS_TEXT),
            metrics_json: dir.join(METRICS_JSON),
            model,
        }
    }
}

/// Only called with a fully fit pipeline, so a failed run never leaves a
/// partial model behind.
pub fn write_artifacts(
    model_path: impl AsRef<Path>,
    pipeline: &FittedPipeline,
    report: &MetricsReport,
) -> Result<ArtifactPaths, ArtifactError> {
    let paths = ArtifactPaths::for_model(model_path);
    pipeline.save(&paths.model)?;

    let write = |path: &Path, contents: String| {
        fs::write(path, contents).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })
    };
    write(&paths.metrics_text, report.to_string())?;
    write(&paths.metrics_json, report.to_json()?)?;

    info!("saved metrics to {}", paths.metrics_text.display());
    Ok(paths)
}
