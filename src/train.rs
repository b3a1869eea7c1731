//! Train/evaluate cycle: drop incomplete rows, split, standardize, fit,
//! evaluate on the held-out partition.

use ndarray::Array2;
use tracing::{info, warn};

use crate::config::TrainConfig;
use crate::error::TrainError;
use crate::metrics::{DatasetSummary, MetricsReport};
use crate::model::{FittedPipeline, LogisticRegression, StandardScaler};
use crate::split::stratified_split;
use crate::types::{FeatureRow, N_FEATURES, SCHEMA};

/// Complete rows as a feature matrix plus labels.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub x: Array2<f64>,
    pub y: Vec<u8>,
}

impl TrainingDataset {
    /// Keep rows with every field present; count what was dropped.
    pub fn from_rows(rows: &[FeatureRow]) -> (Self, DatasetSummary) {
        let mut flat = Vec::with_capacity(rows.len() * N_FEATURES);
        let mut y = Vec::with_capacity(rows.len());
        let mut null_counts = [0usize; N_FEATURES + 1];

        for row in rows {
            match (row.approach_date.as_ref(), row.features()) {
                (Some(_), Some(features)) => {
                    flat.extend_from_slice(&features);
                    y.push(row.is_hazardous);
                }
                _ => {
                    null_counts[0] += usize::from(row.approach_date.is_none());
                    for (count, slot) in null_counts[1..].iter_mut().zip(row.feature_slots()) {
                        *count += usize::from(slot.is_none());
                    }
                }
            }
        }

        let n = y.len();
        let hazardous = y.iter().filter(|&&l| l == 1).count();
        let summary = DatasetSummary {
            input_rows: rows.len(),
            usable_rows: n,
            dropped_rows: rows.len() - n,
            null_counts: SCHEMA
                .iter()
                .zip(null_counts)
                .map(|(f, c)| (f.name.to_string(), c))
                .collect(),
            class_counts: [n - hazardous, hazardous],
            ..Default::default()
        };

        let x = Array2::from_shape_vec((n, N_FEATURES), flat)
            .unwrap_or_else(|_| Array2::zeros((0, N_FEATURES)));
        (Self { x, y }, summary)
    }

    fn select(&self, idx: &[usize]) -> (Array2<f64>, Vec<u8>) {
        let x = self.x.select(ndarray::Axis(0), idx);
        let y = idx.iter().map(|&i| self.y[i]).collect();
        (x, y)
    }
}

/// Fit the standardize + logistic-regression pipeline and evaluate it on a
/// stratified hold-out.
///
/// Fails with [`TrainError::InsufficientData`] when, after dropping rows
/// with nulls, either class has fewer than two examples. Non-convergence is
/// not an error: it is reported through the returned
/// [`MetricsReport::warnings`].
pub fn train(
    rows: &[FeatureRow],
    config: &TrainConfig,
) -> Result<(FittedPipeline, MetricsReport), TrainError> {
    config.validate()?;

    let (data, mut summary) = TrainingDataset::from_rows(rows);
    if summary.dropped_rows > 0 {
        let detail: Vec<String> = summary
            .null_counts
            .iter()
            .filter(|(_, c)| *c > 0)
            .map(|(name, c)| format!("{}={}", name, c))
            .collect();
        info!(
            "dropped {} of {} rows with missing values [{}]",
            summary.dropped_rows,
            summary.input_rows,
            detail.join(", ")
        );
    }

    let [neg, pos] = summary.class_counts;
    if summary.usable_rows == 0 {
        return Err(TrainError::insufficient(format!(
            "no complete rows out of {}",
            summary.input_rows
        )));
    }
    if neg < 2 || pos < 2 {
        return Err(TrainError::insufficient(format!(
            "need at least 2 rows of each class, found {} non-hazardous and {} hazardous",
            neg, pos
        )));
    }

    let split = stratified_split(&data.y, config.test_size, config.seed);
    let (x_train, y_train) = data.select(&split.train);
    let (x_test, y_test) = data.select(&split.test);
    for (name, part) in [("training", &y_train), ("test", &y_test)] {
        if !(part.contains(&0) && part.contains(&1)) {
            return Err(TrainError::insufficient(format!(
                "{} partition of {} rows lacks one class (test_size={})",
                name,
                part.len(),
                config.test_size
            )));
        }
    }
    summary.train_rows = y_train.len();
    summary.test_rows = y_test.len();
    info!(
        "training on {} rows, evaluating on {} (seed={})",
        summary.train_rows, summary.test_rows, config.seed
    );

    let scaler = StandardScaler::fit(x_train.view());
    let x_train = scaler.transform(x_train.view());
    let x_test = scaler.transform(x_test.view());

    let (classifier, convergence) = LogisticRegression::fit(
        x_train.view(),
        &y_train,
        config.c,
        config.max_iter,
        config.tol,
    );
    if !convergence.converged {
        warn!(
            "classifier stopped after {} iterations ({:?}, max |grad| = {:.3e}); model quality may be degraded",
            convergence.n_iter, convergence.stop, convergence.grad_max
        );
    }

    let y_pred = classifier.predict_matrix(x_test.view());
    let report = MetricsReport::new(&y_test, &y_pred, summary, convergence, config.max_iter);
    info!(
        "test accuracy {:.4}, hazardous f1 {:.4}",
        report.classification.accuracy,
        report.classification.class(1).f1
    );

    Ok((FittedPipeline::new(scaler, classifier), report))
}
