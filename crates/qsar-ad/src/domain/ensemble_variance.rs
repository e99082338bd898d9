//! Ensemble-variance applicability domain.
//!
//! The estimator owns a random-forest regressor and scores each row by the
//! population standard deviation of the per-tree predictions.
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, CrossValidation, ForestParams, ThresholdPolicy};
use crate::domain::{
    check_policy, cv_threshold, in_domain, require_target, DomainEstimator, ScoredDomainEstimator,
};
use crate::error::{AdError, Result};
use crate::models::forest::RandomForestRegressor;
use crate::models::regressor_trait::Regressor;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EnsembleVarianceParams {
    pub forest: ForestParams,
    pub threshold: ThresholdPolicy,
    pub score: AdScore,
    pub cv: CrossValidation,
}

impl Default for EnsembleVarianceParams {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            threshold: ThresholdPolicy::CrossValidated,
            score: AdScore::default(),
            cv: CrossValidation::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct EnsembleState {
    forest: RandomForestRegressor,
    threshold: f64,
}

#[derive(Debug, Clone)]
pub struct EnsembleVariance {
    params: EnsembleVarianceParams,
    state: Option<EnsembleState>,
}

impl EnsembleVariance {
    pub fn new(params: EnsembleVarianceParams) -> Result<Self> {
        check_policy("EnsembleVariance", &params.threshold, false)?;
        params.forest.validate()?;
        Ok(Self {
            params,
            state: None,
        })
    }

    pub fn params(&self) -> &EnsembleVarianceParams {
        &self.params
    }

    /// Ensemble mean prediction.
    pub fn predict_value(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.state()?.forest.predict(x)
    }

    fn state(&self) -> Result<&EnsembleState> {
        self.state.as_ref().ok_or(AdError::NotFitted("EnsembleVariance"))
    }
}

impl DomainEstimator for EnsembleVariance {
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()> {
        let y = require_target("EnsembleVariance", x, y)?;
        log::debug!(
            "EnsembleVariance: training {} members on {} samples",
            self.params.forest.n_estimators,
            x.nrows()
        );
        let mut forest = RandomForestRegressor::new(self.params.forest)?;
        forest.fit(x, y)?;

        let threshold = match self.params.threshold {
            ThresholdPolicy::Fixed(v) => v,
            ThresholdPolicy::CrossValidated => {
                let forest_params = self.params.forest;
                cv_threshold(
                    "EnsembleVariance",
                    x,
                    y,
                    &self.params.cv,
                    self.params.score,
                    |fold| {
                        let mut fold_forest = RandomForestRegressor::new(forest_params)?;
                        fold_forest.fit(fold.x_train.view(), fold.y_train.view())?;
                        fold_forest.predict_moments(fold.x_test.view())
                    },
                )?
                .threshold
            }
            ThresholdPolicy::Auto => {
                return Err(AdError::InvalidConfig(
                    "EnsembleVariance threshold must be 'cv' or a float".to_string(),
                ))
            }
        };

        log::info!("EnsembleVariance threshold: {:.6}", threshold);
        self.state = Some(EnsembleState { forest, threshold });
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
        "EnsembleVariance"
    }
}

impl ScoredDomainEstimator for EnsembleVariance {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.state()?.forest.predict_moments(x)?.1)
    }

    fn threshold(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small_forest() -> ForestParams {
        ForestParams {
            n_estimators: 20,
            seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn auto_policy_is_rejected() {
        let params = EnsembleVarianceParams {
            threshold: ThresholdPolicy::Auto,
            ..Default::default()
        };
        assert!(matches!(EnsembleVariance::new(params), Err(AdError::InvalidConfig(_))));
    }

    #[test]
    fn needs_targets() {
        let mut ev = EnsembleVariance::new(EnsembleVarianceParams::default()).unwrap();
        let x = Array2::<f64>::zeros((10, 2));
        assert!(matches!(ev.fit(x.view(), None), Err(AdError::MissingTarget(_))));
    }

    #[test]
    fn fixed_threshold_scores_are_non_negative() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| (i as f64) * (j as f64 + 1.0));
        let y = x.column(0).mapv(|v| v.sin());
        let params = EnsembleVarianceParams {
            forest: small_forest(),
            threshold: ThresholdPolicy::Fixed(0.1),
            ..Default::default()
        };
        let mut ev = EnsembleVariance::new(params).unwrap();
        ev.fit(x.view(), Some(y.view())).unwrap();
        let s = ev.predict_proba(x.view()).unwrap();
        assert_eq!(s.len(), 30);
        assert!(s.iter().all(|v| *v >= 0.0));
        assert_eq!(ev.predict_value(x.view()).unwrap().len(), 30);
        assert_eq!(ev.threshold(), Some(0.1));
    }

    #[test]
    fn cv_threshold_is_one_of_the_scores_or_zero() {
        let x = Array2::from_shape_fn((25, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| if v > 12.0 { 10.0 } else { 0.0 });
        let params = EnsembleVarianceParams {
            forest: small_forest(),
            cv: CrossValidation::new(5, 3).with_n_jobs(1),
            ..Default::default()
        };
        let mut ev = EnsembleVariance::new(params.clone()).unwrap();
        ev.fit(x.view(), Some(y.view())).unwrap();
        let mut again = EnsembleVariance::new(params).unwrap();
        again.fit(x.view(), Some(y.view())).unwrap();
        assert_eq!(ev.threshold(), again.threshold());
        assert!(ev.threshold().unwrap() >= 0.0);
    }
}
