//! Gaussian-process variance applicability domain.
//!
//! Targets are standardised before the GP is fit, and the predictive
//! standard deviation (in standardised units) is the outlyingness score.
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, CrossValidation, GaussianProcessParams, ThresholdPolicy};
use crate::domain::{
    check_policy, cv_threshold, in_domain, require_target, DomainEstimator, ScoredDomainEstimator,
};
use crate::error::{AdError, Result};
use crate::models::gaussian_process::GaussianProcessRegressor;
use crate::models::regressor_trait::Regressor;
use crate::preprocessing::TargetScaler;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GaussianProcessVarianceParams {
    pub gp: GaussianProcessParams,
    pub threshold: ThresholdPolicy,
    pub score: AdScore,
    pub cv: CrossValidation,
}

impl Default for GaussianProcessVarianceParams {
    fn default() -> Self {
        Self {
            gp: GaussianProcessParams::default(),
            threshold: ThresholdPolicy::CrossValidated,
            score: AdScore::default(),
            cv: CrossValidation::default(),
        }
    }
}

impl GaussianProcessVarianceParams {
    /// Build from the textual `threshold` / `score` options, failing with
    /// the allowed values when either is unknown.
    pub fn from_names(threshold: &str, score: &str) -> Result<Self> {
        let params = Self {
            threshold: threshold.parse()?,
            score: score.parse()?,
            ..Default::default()
        };
        check_policy("GPR", &params.threshold, false)?;
        Ok(params)
    }
}

#[derive(Debug, Clone)]
struct GpState {
    gp: GaussianProcessRegressor,
    scaler: TargetScaler,
    threshold: f64,
}

#[derive(Debug, Clone)]
pub struct GaussianProcessVariance {
    params: GaussianProcessVarianceParams,
    state: Option<GpState>,
}

/// Standardise `y`, fit a fresh GP and return it with the scaler.
fn fit_scaled(
    params: &GaussianProcessParams,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(GaussianProcessRegressor, TargetScaler)> {
    let scaler = TargetScaler::fit(y)?;
    let mut gp = GaussianProcessRegressor::new(params.clone())?;
    gp.fit(x, scaler.transform(y).view())?;
    Ok((gp, scaler))
}

impl GaussianProcessVariance {
    pub fn new(params: GaussianProcessVarianceParams) -> Result<Self> {
        check_policy("GPR", &params.threshold, false)?;
        params.gp.validate()?;
        Ok(Self {
            params,
            state: None,
        })
    }

    pub fn params(&self) -> &GaussianProcessVarianceParams {
        &self.params
    }

    /// Predictive mean mapped back to target units.
    pub fn predict_value(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let state = self.state()?;
        let mean = state.gp.predict(x)?;
        Ok(state.scaler.inverse_transform(mean.view()))
    }

    fn state(&self) -> Result<&GpState> {
        self.state.as_ref().ok_or(AdError::NotFitted("GaussianProcessVariance"))
    }
}

impl DomainEstimator for GaussianProcessVariance {
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()> {
        let y = require_target("GaussianProcessVariance", x, y)?;
        log::debug!("GPR: fitting on {} samples x {} descriptors", x.nrows(), x.ncols());
        let (gp, scaler) = fit_scaled(&self.params.gp, x, y)?;

        let threshold = match self.params.threshold {
            ThresholdPolicy::Fixed(v) => v,
            ThresholdPolicy::CrossValidated => {
                let gp_params = &self.params.gp;
                cv_threshold("GPR", x, y, &self.params.cv, self.params.score, |fold| {
                    let (fold_gp, fold_scaler) =
                        fit_scaled(gp_params, fold.x_train.view(), fold.y_train.view())?;
                    let (mean, std) = fold_gp.predict_with_std(fold.x_test.view())?;
                    Ok((fold_scaler.inverse_transform(mean.view()), std))
                })?
                .threshold
            }
            ThresholdPolicy::Auto => {
                return Err(AdError::InvalidConfig(
                    "GPR threshold must be 'cv' or a float".to_string(),
                ))
            }
        };

        log::info!("GPR threshold: {:.6}", threshold);
        self.state = Some(GpState {
            gp,
            scaler,
            threshold,
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
        "GaussianProcessVariance"
    }
}

impl ScoredDomainEstimator for GaussianProcessVariance {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.state()?.gp.predict_with_std(x)?.1)
    }

    fn threshold(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_selection::out_of_fold;
    use ndarray::{array, Array2};

    #[test]
    fn unknown_names_fail_at_construction() {
        let err = GaussianProcessVarianceParams::from_names("auto", "ba_ad")
            .unwrap_err()
            .to_string();
        assert!(err.contains("'cv' or a float"), "{}", err);
        let err = GaussianProcessVarianceParams::from_names("cv", "r2")
            .unwrap_err()
            .to_string();
        assert!(err.contains("ba_ad"), "{}", err);
        let ok = GaussianProcessVarianceParams::from_names("0.5", "rmse_ad").unwrap();
        assert_eq!(ok.threshold, ThresholdPolicy::Fixed(0.5));
        assert_eq!(ok.score, AdScore::RmseDifference);
    }

    #[test]
    fn far_points_are_outside() {
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64 * 0.5);
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0);
        let params = GaussianProcessVarianceParams {
            threshold: ThresholdPolicy::Fixed(0.5),
            ..Default::default()
        };
        let mut gpr = GaussianProcessVariance::new(params).unwrap();
        gpr.fit(x.view(), Some(y.view())).unwrap();
        let verdict = gpr.predict(array![[2.0], [100.0]].view()).unwrap();
        assert_eq!(verdict.to_vec(), vec![true, false]);
        let value = gpr.predict_value(array![[2.0]].view()).unwrap();
        assert!((value[0] - 5.0).abs() < 0.1);
    }

    #[test]
    fn predict_before_fit() {
        let gpr = GaussianProcessVariance::new(GaussianProcessVarianceParams::default()).unwrap();
        assert!(matches!(
            gpr.predict(array![[0.0]].view()),
            Err(AdError::NotFitted(_))
        ));
    }

    #[test]
    fn default_cv_threshold_is_a_pooled_out_of_fold_std() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| match j {
            0 => i as f64 / 10.0,
            _ => ((i * 7) % 40) as f64 / 10.0,
        });
        let y = Array1::from_shape_fn(40, |i| {
            let base = 3.0 * x[(i, 0)] - x[(i, 1)];
            if i == 7 || i == 31 {
                base + 10.0
            } else {
                base
            }
        });
        let params = GaussianProcessVarianceParams {
            cv: CrossValidation::new(5, 42).with_n_jobs(1),
            ..Default::default()
        };
        assert_eq!(params.threshold, ThresholdPolicy::CrossValidated);

        let mut a = GaussianProcessVariance::new(params.clone()).unwrap();
        a.fit(x.view(), Some(y.view())).unwrap();
        let mut b = GaussianProcessVariance::new(params.clone()).unwrap();
        b.fit(x.view(), Some(y.view())).unwrap();
        let threshold = a.threshold().unwrap();
        assert_eq!(Some(threshold), b.threshold());

        let oof = out_of_fold(x.view(), y.view(), &params.cv, |fold| {
            let (gp, _) = fit_scaled(&params.gp, fold.x_train.view(), fold.y_train.view())?;
            let (_, std) = gp.predict_with_std(fold.x_test.view())?;
            Ok((fold.y_test.clone(), std))
        })
        .unwrap();
        assert!(threshold == 0.0 || oof.score.iter().any(|&s| s == threshold));

        let mut rows = oof.rows.clone();
        rows.sort_unstable();
        assert_eq!(rows, (0..40).collect::<Vec<_>>());
        for (k, &r) in oof.rows.iter().enumerate() {
            assert_eq!(oof.y_true[k], y[r]);
        }
        assert_eq!(a.predict(x.view()).unwrap().len(), 40);
        assert_eq!(a.predict_value(x.view()).unwrap().len(), 40);
    }
}
