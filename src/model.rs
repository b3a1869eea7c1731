use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::error::ArtifactError;
use crate::types::{FeatureRow, FEATURE_NAMES, N_FEATURES};

// ---------- Standardization ----------

/// Per-column mean/scale learned from training data only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Population variance (ddof = 0). Constant columns get scale 1.0 so they
    /// map to zero instead of NaN.
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let centered = &x - &mean;
        let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
        let scale = var.mapv(|v| {
            let s = v.sqrt();
            if s > f64::EPSILON { s } else { 1.0 }
        });
        Self {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        }
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = ArrayView1::from(&self.scale[..]);
        (&x - &mean) / &scale
    }

    fn transform_one(&self, x: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut out = [0.0; N_FEATURES];
        for (i, v) in out.iter_mut().enumerate() {
            *v = (x[i] - self.mean[i]) / self.scale[i];
        }
        out
    }
}

// ---------- Logistic regression ----------

/// Why the Newton loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Gradient reached the tolerance.
    Converged,
    /// `max_iter` steps taken without reaching the tolerance.
    IterationBudget,
    /// The Newton system could not be solved; no further step was possible.
    SingularHessian,
}

/// Result of [`LogisticRegression::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    pub converged: bool,
    pub stop: StopReason,
    /// Newton steps taken.
    pub n_iter: usize,
    /// Max-abs gradient at the returned parameters.
    pub grad_max: f64,
}

/// Binary L2-regularized logistic regression with an unpenalized intercept,
/// fit by damped Newton iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + e^z) without overflow.
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

struct Objective<'a, 'b> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'b, f64>,
    n: f64,
    /// 1 / (C * n): L2 weight on the averaged loss
    alpha: f64,
}

impl Objective<'_, '_> {
    fn value(&self, w: &Array1<f64>, b: f64) -> f64 {
        let z = self.x.dot(w) + b;
        let loss: f64 = z
            .iter()
            .zip(self.y.iter())
            .map(|(&z, &y)| softplus(z) - y * z)
            .sum();
        loss / self.n + 0.5 * self.alpha * w.dot(w)
    }

    /// Gradient (weights then intercept) and Hessian over the augmented
    /// parameter vector.
    fn derivatives(&self, w: &Array1<f64>, b: f64) -> (Array1<f64>, Array2<f64>) {
        let d = w.len();
        let z = self.x.dot(w) + b;
        let p = z.mapv(sigmoid);
        let r = &p - &self.y;
        let s = p.mapv(|p| p * (1.0 - p));

        let mut grad = Array1::<f64>::zeros(d + 1);
        grad.slice_mut(ndarray::s![..d])
            .assign(&(self.x.t().dot(&r) / self.n + w * self.alpha));
        grad[d] = r.sum() / self.n;

        let xs = &self.x * &s.view().insert_axis(Axis(1));
        let mut hess = Array2::<f64>::zeros((d + 1, d + 1));
        hess.slice_mut(ndarray::s![..d, ..d])
            .assign(&(self.x.t().dot(&xs) / self.n));
        for i in 0..d {
            hess[[i, i]] += self.alpha;
            let cross = xs.column(i).sum() / self.n;
            hess[[i, d]] = cross;
            hess[[d, i]] = cross;
        }
        hess[[d, d]] = s.sum() / self.n;
        (grad, hess)
    }
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// Gaussian elimination with partial pivoting. `None` if `a` is singular.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let f = a[[row, col]] / a[[col, col]];
            if f == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= f * a[[col, k]];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= a[[row, k]] * x[k];
        }
        x[row] = acc / a[[row, row]];
    }
    Some(x)
}

impl LogisticRegression {
    /// Fit on standardized features `x` and 0/1 labels `y`.
    ///
    /// Stops once the max-abs gradient drops to `tol` or after `max_iter`
    /// Newton steps; the second case is reported through
    /// [`Convergence::converged`], and the last iterate is returned anyway.
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[u8],
        c: f64,
        max_iter: usize,
        tol: f64,
    ) -> (Self, Convergence) {
        let d = x.ncols();
        let y: Array1<f64> = y.iter().map(|&l| f64::from(l)).collect();
        let n = x.nrows().max(1) as f64;
        let obj = Objective {
            x,
            y: y.view(),
            n,
            alpha: 1.0 / (c * n),
        };

        let mut w = Array1::<f64>::zeros(d);
        let mut b = 0.0;
        let mut n_iter = 0;
        let mut converged = false;
        let mut singular = false;

        let (mut grad, mut hess) = obj.derivatives(&w, b);
        while n_iter < max_iter {
            if max_abs(&grad) <= tol {
                converged = true;
                break;
            }
            let Some(step) = solve(hess.clone(), grad.clone()) else {
                debug!("singular Hessian at iteration {}", n_iter);
                singular = true;
                break;
            };

            // backtracking keeps every step a descent step
            let f0 = obj.value(&w, b);
            let slope = grad.dot(&step);
            let mut t = 1.0;
            let mut w_next = w.clone();
            let mut b_next = b;
            for _ in 0..30 {
                w_next = &w - &(step.slice(ndarray::s![..d]).to_owned() * t);
                b_next = b - t * step[d];
                if obj.value(&w_next, b_next) <= f0 - 1e-4 * t * slope {
                    break;
                }
                t *= 0.5;
            }
            w = w_next;
            b = b_next;
            n_iter += 1;
            (grad, hess) = obj.derivatives(&w, b);
        }
        if !converged && max_abs(&grad) <= tol {
            converged = true;
        }

        let stop = if converged {
            StopReason::Converged
        } else if singular {
            StopReason::SingularHessian
        } else {
            StopReason::IterationBudget
        };
        let outcome = Convergence {
            converged,
            stop,
            n_iter,
            grad_max: max_abs(&grad),
        };
        debug!("logistic fit: {:?}", outcome);
        (
            Self {
                coef: w.to_vec(),
                intercept: b,
            },
            outcome,
        )
    }

    pub fn decision(&self, x: &[f64]) -> f64 {
        self.coef.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + self.intercept
    }

    /// Labels for every row of an already standardized matrix.
    pub fn predict_matrix(&self, x: ArrayView2<f64>) -> Vec<u8> {
        let coef = ArrayView1::from(&self.coef[..]);
        x.rows()
            .into_iter()
            .map(|row| u8::from(row.dot(&coef) + self.intercept > 0.0))
            .collect()
    }
}

// ---------- Pipeline ----------

/// Scaler + classifier as fit at training time. Every prediction goes
/// through the same transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    /// Authoritative input order.
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
}

impl FittedPipeline {
    pub fn new(scaler: StandardScaler, classifier: LogisticRegression) -> Self {
        Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            scaler,
            classifier,
        }
    }

    pub fn decision_function(&self, x: &[f64; N_FEATURES]) -> f64 {
        self.classifier.decision(&self.scaler.transform_one(x))
    }

    /// Probability of the hazardous class.
    pub fn predict_proba(&self, x: &[f64; N_FEATURES]) -> f64 {
        sigmoid(self.decision_function(x))
    }

    pub fn predict(&self, x: &[f64; N_FEATURES]) -> u8 {
        u8::from(self.decision_function(x) > 0.0)
    }

    /// `None` when any of the row's features is null.
    pub fn predict_row(&self, row: &FeatureRow) -> Option<u8> {
        row.features().map(|x| self.predict(&x))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let (pipeline, _): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        pipeline.check_shape()?;
        Ok(pipeline)
    }

    fn check_shape(&self) -> Result<(), ArtifactError> {
        let lens = [
            self.feature_names.len(),
            self.scaler.mean.len(),
            self.scaler.scale.len(),
            self.classifier.coef.len(),
        ];
        if lens.iter().any(|&l| l != N_FEATURES) {
            return Err(ArtifactError::Shape(format!(
                "expected {} features, got names/mean/scale/coef = {:?}",
                N_FEATURES, lens
            )));
        }
        Ok(())
    }

    /// Write the pipeline as one binary blob, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let io_err = |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes).map_err(io_err)?;
        info!("saved pipeline ({} bytes) to {}", bytes.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scaler_centers_and_scales() {
        let x = array![[1.0, 10.0, 5.0], [3.0, 10.0, 7.0], [5.0, 10.0, 9.0]];
        let s = StandardScaler::fit(x.view());
        assert_eq!(s.mean, vec![3.0, 10.0, 7.0]);
        assert!((s.scale[0] - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(s.scale[1], 1.0); // constant column

        let t = s.transform(x.view());
        for col in t.columns() {
            assert!(col.sum().abs() < 1e-12);
        }
        assert!(t.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn solves_small_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(a, b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
    }

    fn separable_1d() -> (Array2<f64>, Vec<u8>) {
        let xs = [-2.0, -1.5, -1.0, -0.5, 0.5, 1.0, 1.5, 2.0];
        let x = Array2::from_shape_vec((8, 1), xs.to_vec()).unwrap();
        (x, vec![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn fits_and_converges() {
        let (x, y) = separable_1d();
        let (lr, conv) = LogisticRegression::fit(x.view(), &y, 1.0, 200, 1e-4);
        assert!(conv.converged, "{conv:?}");
        assert_eq!(conv.stop, StopReason::Converged);
        assert!(conv.n_iter > 0);
        assert!(lr.coef[0] > 0.0);
        assert!(lr.intercept.abs() < 1e-6); // symmetric data
        assert_eq!(lr.predict_matrix(x.view()), y);
    }

    #[test]
    fn zero_budget_reports_non_convergence() {
        let (x, y) = separable_1d();
        let (lr, conv) = LogisticRegression::fit(x.view(), &y, 1.0, 0, 1e-4);
        assert!(!conv.converged);
        assert_eq!(conv.stop, StopReason::IterationBudget);
        assert_eq!(conv.n_iter, 0);
        assert!(conv.grad_max > 1e-4);
        assert_eq!(lr.coef, vec![0.0]);
    }

    #[test]
    fn stronger_regularization_shrinks_weights() {
        let (x, y) = separable_1d();
        let (loose, _) = LogisticRegression::fit(x.view(), &y, 10.0, 200, 1e-6);
        let (tight, _) = LogisticRegression::fit(x.view(), &y, 0.1, 200, 1e-6);
        assert!(tight.coef[0] < loose.coef[0]);
    }

    fn pipeline() -> FittedPipeline {
        FittedPipeline::new(
            StandardScaler {
                mean: vec![20.0, 0.2, 0.5, 15.0, 3.0e7],
                scale: vec![2.0, 0.1, 0.2, 5.0, 1.0e7],
            },
            LogisticRegression {
                coef: vec![-1.0, 0.5, 0.5, 0.2, -0.8],
                intercept: -0.3,
            },
        )
    }

    #[test]
    fn pipeline_applies_scaler_before_classifier() {
        let p = pipeline();
        let x = [20.0, 0.2, 0.5, 15.0, 3.0e7]; // exactly the mean
        assert!((p.decision_function(&x) + 0.3).abs() < 1e-12);
        assert_eq!(p.predict(&x), 0);
        assert_eq!(p.predict(&[16.0, 0.4, 0.9, 20.0, 1.0e7]), 1);
        assert!((p.predict_proba(&x) - sigmoid(-0.3)).abs() < 1e-12);
    }

    #[test]
    fn predict_row_needs_all_features() {
        let p = pipeline();
        let row = FeatureRow {
            approach_date: None,
            absolute_magnitude_h: Some(16.0),
            diameter_km_min: Some(0.4),
            diameter_km_max: Some(0.9),
            rel_velocity_km_s: Some(20.0),
            miss_distance_km: None,
            is_hazardous: 0,
        };
        assert_eq!(p.predict_row(&row), None);
        let row = FeatureRow {
            miss_distance_km: Some(1.0e7),
            ..row
        };
        assert_eq!(p.predict_row(&row), Some(1));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts").join("neo_logreg.bin");
        let p = pipeline();
        p.save(&path).unwrap();

        let loaded = FittedPipeline::load(&path).unwrap();
        assert_eq!(loaded, p);
        let x = [18.0, 0.3, 0.6, 12.0, 2.0e7];
        assert_eq!(loaded.decision_function(&x), p.decision_function(&x));
    }

    #[test]
    fn rejects_wrong_shape() {
        let mut p = pipeline();
        p.classifier.coef.pop();
        let bytes = p.to_bytes().unwrap();
        assert!(matches!(
            FittedPipeline::from_bytes(&bytes),
            Err(ArtifactError::Shape(_))
        ));
        assert!(FittedPipeline::from_bytes(&[1, 2, 3]).is_err());
    }
}
