//! Applicability-domain estimators.
//!
//! Every continuous estimator produces an outlyingness score where larger
//! means further outside the domain, and marks a sample in domain when
//! `score <= threshold`. The structural (reaction-type) estimator works on
//! signatures instead of descriptors and lives outside `AdMethod`.
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, CrossValidation, ThresholdPolicy};
use crate::error::{check_len, AdError, Result};
use crate::model_selection::{out_of_fold, FoldData};
use crate::threshold::{optimize_threshold, Comparison, ThresholdSearch};

pub mod bounding_box;
pub mod ensemble_variance;
pub mod gaussian_process;
pub mod leverage;
pub mod reaction_type;
pub mod similarity;
pub mod two_class;

pub use bounding_box::BoundingBox;
pub use ensemble_variance::{EnsembleVariance, EnsembleVarianceParams};
pub use gaussian_process::{GaussianProcessVariance, GaussianProcessVarianceParams};
pub use leverage::{Leverage, LeverageParams};
pub use reaction_type::{
    select_environment, Environment, EnvironmentSelection, PrecomputedSignatures,
    ReactionSignature, ReactionTypeControl,
};
pub use similarity::{SimilarityDistance, SimilarityParams};
pub use two_class::{TwoClassClassifier, TwoClassParams};

/// Fit / predict contract shared by the descriptor-based AD estimators.
pub trait DomainEstimator: Send + Sync {
    /// Learn the domain from training descriptors. `y` is required when
    /// the estimator trains a model or searches its threshold by CV.
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()>;

    /// `true` for every row inside the applicability domain.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<bool>>;

    fn is_fitted(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Estimators with a continuous outlyingness score and a cutoff.
pub trait ScoredDomainEstimator: DomainEstimator {
    /// Outlyingness score per row, larger is further outside.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Cutoff selected at fit, `None` before fit.
    fn threshold(&self) -> Option<f64>;
}

/// Verdict for a score vector under the shared `<=` convention.
pub(crate) fn in_domain(score: ArrayView1<f64>, threshold: f64) -> Array1<bool> {
    Comparison::LessEqual.apply(score, threshold)
}

/// Return `y` (checked against `x`) or fail with `MissingTarget`.
pub(crate) fn require_target<'a>(
    estimator: &'static str,
    x: ArrayView2<f64>,
    y: Option<ArrayView1<'a, f64>>,
) -> Result<ArrayView1<'a, f64>> {
    let y = y.ok_or(AdError::MissingTarget(estimator))?;
    check_len("fit: target length", x.nrows(), y.len())?;
    Ok(y)
}

/// Pooled out-of-fold threshold search with the `<=` convention.
pub(crate) fn cv_threshold<F>(
    estimator: &'static str,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    cv: &CrossValidation,
    score: AdScore,
    fold_fn: F,
) -> Result<ThresholdSearch>
where
    F: Fn(&FoldData) -> Result<(Array1<f64>, Array1<f64>)> + Sync,
{
    log::debug!(
        "{}: {}-fold threshold search on {} samples ({})",
        estimator,
        cv.n_splits,
        x.nrows(),
        score
    );
    let oof = out_of_fold(x, y, cv, fold_fn)?;
    optimize_threshold(
        oof.y_true.view(),
        oof.y_pred.view(),
        oof.score.view(),
        Comparison::LessEqual,
        score,
    )
}

/// AD method and its parameters, as read from configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AdConfig {
    #[default]
    BoundingBox,
    Leverage(LeverageParams),
    SimilarityDistance(SimilarityParams),
    EnsembleVariance(EnsembleVarianceParams),
    GaussianProcessVariance(GaussianProcessVarianceParams),
    TwoClass(TwoClassParams),
}

/// Closed set of descriptor-based AD estimators, selected at configuration
/// time.
#[derive(Debug)]
pub enum AdMethod {
    BoundingBox(BoundingBox),
    Leverage(Leverage),
    SimilarityDistance(SimilarityDistance),
    EnsembleVariance(EnsembleVariance),
    GaussianProcessVariance(GaussianProcessVariance),
    TwoClass(TwoClassClassifier),
}

impl AdMethod {
    /// Validate `config` and build the matching unfitted estimator.
    pub fn from_config(config: &AdConfig) -> Result<Self> {
        Ok(match config {
            AdConfig::BoundingBox => AdMethod::BoundingBox(BoundingBox::new()),
            AdConfig::Leverage(p) => AdMethod::Leverage(Leverage::new(p.clone())?),
            AdConfig::SimilarityDistance(p) => {
                AdMethod::SimilarityDistance(SimilarityDistance::new(p.clone())?)
            }
            AdConfig::EnsembleVariance(p) => {
                AdMethod::EnsembleVariance(EnsembleVariance::new(p.clone())?)
            }
            AdConfig::GaussianProcessVariance(p) => {
                AdMethod::GaussianProcessVariance(GaussianProcessVariance::new(p.clone())?)
            }
            AdConfig::TwoClass(p) => AdMethod::TwoClass(TwoClassClassifier::new(p.clone())?),
        })
    }

    fn as_estimator(&self) -> &dyn DomainEstimator {
        match self {
            AdMethod::BoundingBox(m) => m,
            AdMethod::Leverage(m) => m,
            AdMethod::SimilarityDistance(m) => m,
            AdMethod::EnsembleVariance(m) => m,
            AdMethod::GaussianProcessVariance(m) => m,
            AdMethod::TwoClass(m) => m,
        }
    }

    fn as_estimator_mut(&mut self) -> &mut dyn DomainEstimator {
        match self {
            AdMethod::BoundingBox(m) => m,
            AdMethod::Leverage(m) => m,
            AdMethod::SimilarityDistance(m) => m,
            AdMethod::EnsembleVariance(m) => m,
            AdMethod::GaussianProcessVariance(m) => m,
            AdMethod::TwoClass(m) => m,
        }
    }

    fn as_scored(&self) -> Option<&dyn ScoredDomainEstimator> {
        match self {
            AdMethod::BoundingBox(_) => None,
            AdMethod::Leverage(m) => Some(m),
            AdMethod::SimilarityDistance(m) => Some(m),
            AdMethod::EnsembleVariance(m) => Some(m),
            AdMethod::GaussianProcessVariance(m) => Some(m),
            AdMethod::TwoClass(m) => Some(m),
        }
    }

    /// Outlyingness scores, or `None` for the bounding box which only
    /// gives a verdict.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Option<Array1<f64>>> {
        self.as_scored().map(|m| m.predict_proba(x)).transpose()
    }

    pub fn threshold(&self) -> Option<f64> {
        self.as_scored().and_then(|m| m.threshold())
    }
}

impl DomainEstimator for AdMethod {
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()> {
        self.as_estimator_mut().fit(x, y)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<bool>> {
        self.as_estimator().predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.as_estimator().is_fitted()
    }

    fn name(&self) -> &'static str {
        self.as_estimator().name()
    }
}

/// Validate a threshold policy for an estimator and log what it will do.
pub(crate) fn check_policy(
    estimator: &'static str,
    policy: &ThresholdPolicy,
    allow_auto: bool,
) -> Result<()> {
    policy.validate(estimator, allow_auto)?;
    log::trace!("{} threshold policy: {:?}", estimator, policy);
    Ok(())
}
