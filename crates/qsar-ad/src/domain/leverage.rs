//! Leverage (hat-matrix diagonal) applicability domain.
//!
//! Rows are augmented with a leading ones column and scored by
//! `xᵀ (XᵀX + εI)⁻¹ x`. With the augmented column the training leverages
//! sum to `p + 1`, the rank of the design matrix.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, CrossValidation, RegressorConfig, ThresholdPolicy};
use crate::domain::{
    check_policy, cv_threshold, in_domain, require_target, DomainEstimator, ScoredDomainEstimator,
};
use crate::error::{check_len, AdError, Result};
use crate::math::{gram_inverse, row_quadratic_forms, with_intercept};
use crate::models::factory::build_regressor;

/// Ridge added to the Gram diagonal before inversion.
pub const LEVERAGE_RIDGE: f64 = 1e-8;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LeverageParams {
    pub threshold: ThresholdPolicy,
    pub score: AdScore,
    /// Regressor trained per fold for `ThresholdPolicy::CrossValidated`.
    pub regressor: Option<RegressorConfig>,
    pub cv: CrossValidation,
}

impl Default for LeverageParams {
    fn default() -> Self {
        Self {
            threshold: ThresholdPolicy::Auto,
            score: AdScore::default(),
            regressor: None,
            cv: CrossValidation::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct LeverageState {
    inv: Array2<f64>,
    threshold: f64,
    hat_values: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct Leverage {
    params: LeverageParams,
    state: Option<LeverageState>,
}

fn leverages(x: ArrayView2<f64>, inv: ArrayView2<f64>) -> Array1<f64> {
    row_quadratic_forms(with_intercept(x).view(), inv)
}

fn fit_inverse(x: ArrayView2<f64>) -> Result<Array2<f64>> {
    gram_inverse(with_intercept(x).view(), LEVERAGE_RIDGE)
}

impl Leverage {
    pub fn new(params: LeverageParams) -> Result<Self> {
        check_policy("Leverage", &params.threshold, true)?;
        if params.threshold.needs_target() && params.regressor.is_none() {
            return Err(AdError::InvalidConfig(
                "Leverage threshold 'cv' needs a regressor".to_string(),
            ));
        }
        Ok(Self {
            params,
            state: None,
        })
    }

    pub fn params(&self) -> &LeverageParams {
        &self.params
    }

    /// Leverages of the training rows, computed at fit.
    pub fn hat_values(&self) -> Option<ArrayView1<'_, f64>> {
        self.state.as_ref().map(|s| s.hat_values.view())
    }

    fn state(&self) -> Result<&LeverageState> {
        self.state.as_ref().ok_or(AdError::NotFitted("Leverage"))
    }
}

impl DomainEstimator for Leverage {
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()> {
        let (n, p) = x.dim();
        if n == 0 {
            return Err(AdError::InvalidInput("cannot fit leverage on zero samples".to_string()));
        }
        log::debug!("Leverage: fitting on {} samples x {} descriptors", n, p);

        let inv = fit_inverse(x)?;
        let hat_values = leverages(x, inv.view());

        let threshold = match self.params.threshold {
            ThresholdPolicy::Fixed(v) => v,
            ThresholdPolicy::Auto => 3.0 * (1.0 + p as f64) / n as f64,
            ThresholdPolicy::CrossValidated => {
                let y = require_target("Leverage", x, y)?;
                let regressor = self.params.regressor.as_ref().ok_or_else(|| {
                    AdError::InvalidConfig("Leverage threshold 'cv' needs a regressor".to_string())
                })?;
                cv_threshold("Leverage", x, y, &self.params.cv, self.params.score, |fold| {
                    let fold_inv = fit_inverse(fold.x_train.view())?;
                    let score = leverages(fold.x_test.view(), fold_inv.view());
                    let mut model = build_regressor(regressor)?;
                    model.fit(fold.x_train.view(), fold.y_train.view())?;
                    Ok((model.predict(fold.x_test.view())?, score))
                })?
                .threshold
            }
        };

        log::info!("Leverage threshold: {:.6}", threshold);
        self.state = Some(LeverageState {
            inv,
            threshold,
            hat_values,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<bool>> {
        let threshold = self.state()?.threshold;
        Ok(in_domain(self.predict_proba(x)?.view(), threshold))
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn name(&self) -> &'static str {
        "Leverage"
    }
}

impl ScoredDomainEstimator for Leverage {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let state = self.state()?;
        check_len("Leverage::predict_proba: descriptor count", state.inv.nrows() - 1, x.ncols())?;
        Ok(leverages(x, state.inv.view()))
    }

    fn threshold(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.threshold)
    }
}
