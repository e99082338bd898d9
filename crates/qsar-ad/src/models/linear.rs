use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{check_len, AdError, Result};
use crate::math::{invert, with_intercept};
use crate::models::regressor_trait::{finite_output, Regressor};

/// Ridge regression with an unpenalised intercept, solved in closed form.
#[derive(Debug, Clone)]
pub struct RidgeRegression {
    alpha: f64,
    /// Intercept followed by one coefficient per descriptor.
    coef: Option<Array1<f64>>,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha.is_finite() && alpha >= 0.0) {
            return Err(AdError::InvalidConfig(format!(
                "ridge alpha must be finite and >= 0, got {}",
                alpha
            )));
        }
        Ok(RidgeRegression { alpha, coef: None })
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_len("RidgeRegression::fit: y", x.nrows(), y.len())?;
        let design = with_intercept(x);
        let mut gram = design.t().dot(&design);
        // the intercept (index 0) is left unpenalised
        for i in 1..gram.nrows() {
            gram[(i, i)] += self.alpha;
        }
        // keeps the system solvable for alpha == 0 on rank-deficient input
        gram[(0, 0)] += 1e-12;
        let inv = invert(gram)?;
        self.coef = Some(inv.dot(&design.t().dot(&y)));
        log::trace!("Ridge fitted on {} x {} (alpha={})", x.nrows(), x.ncols(), self.alpha);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coef = self.coef.as_ref().ok_or(AdError::NotFitted("RidgeRegression"))?;
        check_len("RidgeRegression::predict: descriptor count", coef.len() - 1, x.ncols())?;
        finite_output(self.name(), with_intercept(x).dot(coef))
    }

    fn name(&self) -> &str {
        "ridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn recovers_a_linear_relation() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64 + (j as f64) * (i % 3) as f64);
        let y = x.column(0).mapv(|v| 3.0 * v) + &x.column(1).mapv(|v| -0.5 * v) + 2.0;
        let mut model = RidgeRegression::new(0.0).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn intercept_is_not_shrunk() {
        // constant target: heavy penalty still predicts the mean exactly
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![5.0, 5.0, 5.0, 5.0];
        let mut model = RidgeRegression::new(1e6).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(array![[10.0]].view()).unwrap();
        assert!((pred[0] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn negative_alpha_is_rejected() {
        assert!(RidgeRegression::new(-1.0).is_err());
    }
}
