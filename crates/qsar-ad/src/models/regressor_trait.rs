use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{AdError, Result};

/// Regression model protocol used inside AD cross-validation loops.
///
/// Every fold builds a fresh instance from configuration, so
/// implementations never share fitted state across folds.
pub trait Regressor: Send + Sync {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "regressor"
    }
}

/// Binary probabilistic classifier. Labels are `true` for the positive
/// class; `predict_proba` returns `P(true)` per row.
pub trait Classifier: Send + Sync {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[bool]) -> Result<()>;

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    fn name(&self) -> &str {
        "classifier"
    }
}

/// Pass model output through, or fail with `AdError::Model` when the model
/// produced NaN or infinite values.
pub(crate) fn finite_output(model: &str, values: Array1<f64>) -> Result<Array1<f64>> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(row) => Err(AdError::Model(format!(
            "{} produced a non-finite output ({}) at row {}",
            model, values[row], row
        ))),
        None => Ok(values),
    }
}
