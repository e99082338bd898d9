//! Two-class (reliable vs unreliable prediction) applicability domain.
//!
//! A regressor is cross-validated on the training set; rows whose
//! out-of-fold error is within three RMSE are labelled reliable and a
//! classifier learns that label from the descriptors. The outlyingness
//! score is `1 - P(reliable)`.
use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, ClassifierConfig, CrossValidation, RegressorConfig, ThresholdPolicy};
use crate::domain::{
    check_policy, cv_threshold, in_domain, require_target, DomainEstimator, ScoredDomainEstimator,
};
use crate::error::{AdError, Result};
use crate::model_selection::cross_val_predict;
use crate::models::factory::{build_classifier, build_regressor};
use crate::models::regressor_trait::Classifier;
use crate::stats::reliable_mask;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TwoClassParams {
    pub regressor: RegressorConfig,
    pub classifier: ClassifierConfig,
    pub threshold: ThresholdPolicy,
    pub score: AdScore,
    pub cv: CrossValidation,
}

impl Default for TwoClassParams {
    fn default() -> Self {
        Self {
            regressor: RegressorConfig::default(),
            classifier: ClassifierConfig::default(),
            threshold: ThresholdPolicy::CrossValidated,
            score: AdScore::default(),
            cv: CrossValidation::default(),
        }
    }
}

struct TwoClassState {
    classifier: Box<dyn Classifier>,
    threshold: f64,
    /// Share of training rows labelled reliable.
    reliable_fraction: f64,
}

pub struct TwoClassClassifier {
    params: TwoClassParams,
    state: Option<TwoClassState>,
}

impl fmt::Debug for TwoClassClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoClassClassifier")
            .field("params", &self.params)
            .field("threshold", &self.threshold())
            .finish()
    }
}

/// Reliability labels from out-of-fold predictions, then a classifier
/// trained on them.
fn train_reliability_classifier(
    params: &TwoClassParams,
    cv: &CrossValidation,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(Box<dyn Classifier>, f64)> {
    let oof = cross_val_predict(x, y, &params.regressor, cv)?;
    let labels = reliable_mask(y, oof.view());
    let reliable = labels.iter().filter(|&&l| l).count() as f64 / labels.len().max(1) as f64;
    let mut classifier = build_classifier(&params.classifier)?;
    classifier.fit(x, &labels)?;
    Ok((classifier, reliable))
}

impl TwoClassClassifier {
    pub fn new(params: TwoClassParams) -> Result<Self> {
        check_policy("TwoClass", &params.threshold, false)?;
        // surface invalid model settings before any fit
        build_regressor(&params.regressor)?;
        build_classifier(&params.classifier)?;
        Ok(Self {
            params,
            state: None,
        })
    }

    pub fn params(&self) -> &TwoClassParams {
        &self.params
    }

    /// Fraction of training rows labelled reliable at fit.
    pub fn reliable_fraction(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.reliable_fraction)
    }

    fn state(&self) -> Result<&TwoClassState> {
        self.state.as_ref().ok_or(AdError::NotFitted("TwoClassClassifier"))
    }
}

impl DomainEstimator for TwoClassClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()> {
        let y = require_target("TwoClassClassifier", x, y)?;
        log::debug!(
            "TwoClass: labelling {} samples from {}-fold predictions",
            x.nrows(),
            self.params.cv.n_splits
        );
        let (classifier, reliable_fraction) =
            train_reliability_classifier(&self.params, &self.params.cv, x, y)?;

        let threshold = match self.params.threshold {
            ThresholdPolicy::Fixed(v) => v,
            ThresholdPolicy::CrossValidated => {
                let params = &self.params;
                // inner loops stay sequential; the outer folds own the pool
                let inner_cv = CrossValidation {
                    n_jobs: Some(1),
                    ..params.cv
                };
                cv_threshold("TwoClass", x, y, &params.cv, params.score, |fold| {
                    let (fold_clf, _) = train_reliability_classifier(
                        params,
                        &inner_cv,
                        fold.x_train.view(),
                        fold.y_train.view(),
                    )?;
                    let mut model = build_regressor(&params.regressor)?;
                    model.fit(fold.x_train.view(), fold.y_train.view())?;
                    let y_pred = model.predict(fold.x_test.view())?;
                    let score = fold_clf.predict_proba(fold.x_test.view())?.mapv(|p| 1.0 - p);
                    Ok((y_pred, score))
                })?
                .threshold
            }
            ThresholdPolicy::Auto => {
                return Err(AdError::InvalidConfig(
                    "TwoClass threshold must be 'cv' or a float".to_string(),
                ))
            }
        };

        log::info!(
            "TwoClass threshold: {:.4} ({:.1}% of training rows reliable)",
            threshold,
            reliable_fraction * 100.0
        );
        self.state = Some(TwoClassState {
            classifier,
            threshold,
            reliable_fraction,
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
        "TwoClass"
    }
}

impl ScoredDomainEstimator for TwoClassClassifier {
    /// `1 - P(reliable)` per row.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let p = self.state()?.classifier.predict_proba(x)?;
        Ok(p.mapv(|v| 1.0 - v))
    }

    fn threshold(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestParams;
    use ndarray::Array2;

    fn quick_params(threshold: ThresholdPolicy) -> TwoClassParams {
        let forest = ForestParams {
            n_estimators: 10,
            seed: 1,
            ..Default::default()
        };
        TwoClassParams {
            regressor: RegressorConfig::Ridge { alpha: 1e-3 },
            classifier: ClassifierConfig::RandomForest(forest),
            threshold,
            score: AdScore::BalancedAccuracy,
            cv: CrossValidation::new(3, 5).with_n_jobs(1),
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        // linear target except for a block of rows that no linear model fits
        let x = Array2::from_shape_fn((30, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 2) as f64 });
        let y = x
            .column(0)
            .mapv(|v| if (10.0..13.0).contains(&v) { v + 40.0 } else { v });
        (x, y)
    }

    #[test]
    fn scores_are_probabilities_of_unreliability() {
        let (x, y) = data();
        let mut tc = TwoClassClassifier::new(quick_params(ThresholdPolicy::Fixed(0.5))).unwrap();
        tc.fit(x.view(), Some(y.view())).unwrap();
        let s = tc.predict_proba(x.view()).unwrap();
        assert!(s.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(tc.reliable_fraction().unwrap() > 0.5);
        assert_eq!(tc.predict(x.view()).unwrap().len(), 30);
    }

    #[test]
    fn nested_cv_is_reproducible() {
        let (x, y) = data();
        let mut a = TwoClassClassifier::new(quick_params(ThresholdPolicy::CrossValidated)).unwrap();
        a.fit(x.view(), Some(y.view())).unwrap();
        let mut b = TwoClassClassifier::new(quick_params(ThresholdPolicy::CrossValidated)).unwrap();
        b.fit(x.view(), Some(y.view())).unwrap();
        assert_eq!(a.threshold(), b.threshold());
    }

    #[test]
    fn auto_is_rejected() {
        assert!(TwoClassClassifier::new(quick_params(ThresholdPolicy::Auto)).is_err());
    }
}
