//! Classification report and confusion matrix.
//!
//! Everything is computed for the fixed label order `[0, 1]` and kept as
//! plain data so callers can inspect individual cells; [`std::fmt::Display`]
//! renders the human-readable form written to `metrics.txt`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Convergence, StopReason};

pub const LABELS: [u8; 2] = [0, 1];

/// Row = actual label, column = predicted label, both in [`LABELS`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix(pub [[usize; 2]; 2]);

impl ConfusionMatrix {
    pub fn from_predictions(actual: &[u8], predicted: &[u8]) -> Self {
        assert_eq!(
            actual.len(),
            predicted.len(),
            "actual and predicted must have same length"
        );
        let mut m = [[0usize; 2]; 2];
        for (&a, &p) in actual.iter().zip(predicted) {
            assert!(a <= 1 && p <= 1, "labels must be 0 or 1, got actual={a} predicted={p}");
            m[usize::from(a)][usize::from(p)] += 1;
        }
        Self(m)
    }

    /// Count for one cell; `None` for a label outside [`LABELS`].
    pub fn get(&self, actual: u8, predicted: u8) -> Option<usize> {
        self.0
            .get(usize::from(actual))?
            .get(usize::from(predicted))
            .copied()
    }

    pub fn total(&self) -> usize {
        self.0.iter().flatten().sum()
    }

    /// Rows with this actual label.
    pub fn support(&self, label: u8) -> usize {
        self.0[usize::from(label)].iter().sum()
    }

    /// Rows predicted as this label.
    pub fn predicted(&self, label: u8) -> usize {
        self.0.iter().map(|row| row[usize::from(label)]).sum()
    }

    pub fn correct(&self) -> usize {
        self.0[0][0] + self.0[1][1]
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self
            .0
            .iter()
            .flatten()
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(1);
        writeln!(f, "[[{:>w$} {:>w$}]", self.0[0][0], self.0[0][1], w = w)?;
        write!(f, " [{:>w$} {:>w$}]]", self.0[1][0], self.0[1][1], w = w)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    // zero division scores 0.0
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

impl ClassMetrics {
    fn for_label(cm: &ConfusionMatrix, label: u8) -> Self {
        let tp = cm.0[usize::from(label)][usize::from(label)];
        let precision = ratio(tp, cm.predicted(label));
        let recall = ratio(tp, cm.support(label));
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: cm.support(label),
        }
    }
}

/// Per-class precision/recall/F1/support plus accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Indexed by label: `classes[0]` is non-hazardous, `classes[1]` hazardous.
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let classes = LABELS.map(|l| ClassMetrics::for_label(cm, l));
        let total = cm.total();

        let avg = |weight: &dyn Fn(&ClassMetrics) -> f64| {
            let wsum: f64 = classes.iter().map(weight).sum();
            let mean = |get: fn(&ClassMetrics) -> f64| {
                if wsum > 0.0 {
                    classes.iter().map(|c| weight(c) * get(c)).sum::<f64>() / wsum
                } else {
                    0.0
                }
            };
            ClassMetrics {
                precision: mean(|c| c.precision),
                recall: mean(|c| c.recall),
                f1: mean(|c| c.f1),
                support: total,
            }
        };

        Self {
            classes,
            accuracy: ratio(cm.correct(), total),
            macro_avg: avg(&|_: &ClassMetrics| 1.0),
            weighted_avg: avg(&|c: &ClassMetrics| c.support as f64),
        }
    }

    pub fn class(&self, label: u8) -> &ClassMetrics {
        &self.classes[usize::from(label)]
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = "weighted avg".len();
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, c) in LABELS.iter().zip(&self.classes) {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, c) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}

/// Row accounting for the null-drop step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub input_rows: usize,
    pub usable_rows: usize,
    pub dropped_rows: usize,
    /// Per column (schema order, label excluded): nulls among dropped rows.
    pub null_counts: Vec<(String, usize)>,
    pub train_rows: usize,
    pub test_rows: usize,
    /// [non-hazardous, hazardous] among usable rows.
    pub class_counts: [usize; 2],
}

/// Non-fatal conditions attached to a finished training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainingWarning {
    /// The classifier stopped short of the tolerance, either out of
    /// budget or on a singular Newton system. The returned pipeline is
    /// usable but should be treated as degraded.
    NonConvergence {
        reason: StopReason,
        n_iter: usize,
        max_iter: usize,
        grad_max: f64,
    },
}

impl fmt::Display for TrainingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonConvergence {
                reason: StopReason::SingularHessian,
                n_iter,
                grad_max,
                ..
            } => write!(
                f,
                "logistic regression stopped after {} iterations on a singular Hessian (max |grad| = {:.3e})",
                n_iter, grad_max
            ),
            Self::NonConvergence {
                max_iter, grad_max, ..
            } => write!(
                f,
                "logistic regression did not converge within {} iterations (max |grad| = {:.3e})",
                max_iter, grad_max
            ),
        }
    }
}

/// Evaluation of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub classification: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    pub dataset: DatasetSummary,
    pub convergence: Convergence,
    pub warnings: Vec<TrainingWarning>,
}

impl MetricsReport {
    pub fn new(
        actual: &[u8],
        predicted: &[u8],
        dataset: DatasetSummary,
        convergence: Convergence,
        max_iter: usize,
    ) -> Self {
        let confusion_matrix = ConfusionMatrix::from_predictions(actual, predicted);
        let mut warnings = Vec::new();
        if !convergence.converged {
            warnings.push(TrainingWarning::NonConvergence {
                reason: convergence.stop,
                n_iter: convergence.n_iter,
                max_iter,
                grad_max: convergence.grad_max,
            });
        }
        Self {
            classification: ClassificationReport::from_confusion(&confusion_matrix),
            confusion_matrix,
            dataset,
            convergence,
            warnings,
        }
    }

    pub fn converged(&self) -> bool {
        self.convergence.converged
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classification Report:")?;
        writeln!(f, "{}", self.classification)?;
        writeln!(f, "Confusion Matrix:")?;
        writeln!(f, "{}", self.confusion_matrix)?;
        if self.dataset.dropped_rows > 0 {
            writeln!(
                f,
                "\nDropped {} of {} rows with missing values",
                self.dataset.dropped_rows, self.dataset.input_rows
            )?;
        }
        for w in &self.warnings {
            writeln!(f, "\nWARNING: {}", w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn confusion_cells_follow_actual_then_predicted() {
        let actual = [0, 0, 0, 1, 1, 1, 1];
        let predicted = [0, 1, 0, 1, 0, 1, 1];
        let cm = ConfusionMatrix::from_predictions(&actual, &predicted);
        assert_eq!(cm.0, [[2, 1], [1, 3]]);
        assert_eq!(cm.get(1, 0), Some(1));
        assert_eq!(cm.get(2, 0), None);
        assert_eq!(cm.get(0, 5), None);
        assert_eq!(cm.support(1), 4);
        assert_eq!(cm.predicted(1), 4);
        assert_eq!(cm.total(), 7);
    }

    #[test]
    fn report_matches_hand_computed_values() {
        // tn=2 fp=1 fn=1 tp=3
        let cm = ConfusionMatrix([[2, 1], [1, 3]]);
        let r = ClassificationReport::from_confusion(&cm);

        let c1 = r.class(1);
        assert!(close(c1.precision, 0.75));
        assert!(close(c1.recall, 0.75));
        assert!(close(c1.f1, 0.75));
        assert_eq!(c1.support, 4);

        let c0 = r.class(0);
        assert!(close(c0.precision, 2.0 / 3.0));
        assert!(close(c0.recall, 2.0 / 3.0));
        assert_eq!(c0.support, 3);

        assert!(close(r.accuracy, 5.0 / 7.0));
        assert!(close(r.macro_avg.precision, (2.0 / 3.0 + 0.75) / 2.0));
        assert!(close(r.weighted_avg.recall, (3.0 * 2.0 / 3.0 + 4.0 * 0.75) / 7.0));
        assert_eq!(r.weighted_avg.support, 7);
    }

    #[test]
    fn never_predicted_class_scores_zero() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1], &[0, 0, 0, 0]);
        let r = ClassificationReport::from_confusion(&cm);
        assert_eq!(r.class(1).precision, 0.0);
        assert_eq!(r.class(1).recall, 0.0);
        assert_eq!(r.class(1).f1, 0.0);
        assert!(close(r.class(0).recall, 1.0));
    }

    #[test]
    fn text_and_json_forms() {
        let dataset = DatasetSummary {
            input_rows: 10,
            usable_rows: 8,
            dropped_rows: 2,
            ..Default::default()
        };
        let conv = Convergence {
            converged: false,
            stop: StopReason::IterationBudget,
            n_iter: 3,
            grad_max: 0.5,
        };
        let report = MetricsReport::new(&[0, 1, 1, 0], &[0, 1, 0, 0], dataset, conv, 3);
        assert!(!report.converged());
        assert_eq!(report.warnings.len(), 1);

        let text = report.to_string();
        assert!(text.starts_with("Classification Report:"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("Confusion Matrix:\n[[2 0]\n [1 1]]"));
        assert!(text.contains("Dropped 2 of 10 rows"));
        assert!(text.contains("did not converge within 3 iterations"));

        let back: MetricsReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(back.confusion_matrix, report.confusion_matrix);
        assert_eq!(back.classification.class(1).support, 2);
    }

    #[test]
    fn singular_stop_is_reported_with_its_iteration() {
        let conv = Convergence {
            converged: false,
            stop: StopReason::SingularHessian,
            n_iter: 4,
            grad_max: 0.02,
        };
        let report = MetricsReport::new(&[0, 1], &[0, 1], DatasetSummary::default(), conv, 200);
        assert_eq!(
            report.warnings,
            vec![TrainingWarning::NonConvergence {
                reason: StopReason::SingularHessian,
                n_iter: 4,
                max_iter: 200,
                grad_max: 0.02,
            }]
        );
        let text = report.to_string();
        assert!(text.contains("stopped after 4 iterations on a singular Hessian"));
        assert!(!text.contains("within 200 iterations"));
    }

    #[test]
    #[should_panic(expected = "labels must be 0 or 1")]
    fn out_of_range_label_is_rejected() {
        ConfusionMatrix::from_predictions(&[0, 2], &[0, 1]);
    }
}
