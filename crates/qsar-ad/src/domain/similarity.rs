//! Nearest-neighbour distance applicability domain.
//!
//! Calibration uses each training row's distance to its nearest *other*
//! training row (k=2, self dropped); queries use the plain nearest
//! training row (k=1).
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, CrossValidation, RegressorConfig, ThresholdPolicy};
use crate::domain::{
    check_policy, cv_threshold, in_domain, require_target, DomainEstimator, ScoredDomainEstimator,
};
use crate::error::{AdError, Result};
use crate::models::factory::build_regressor;
use crate::neighbors::{BallTree, Metric};
use crate::stats::mean_std;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimilarityParams {
    pub threshold: ThresholdPolicy,
    pub score: AdScore,
    pub metric: Metric,
    pub leaf_size: usize,
    /// Regressor trained per fold for `ThresholdPolicy::CrossValidated`.
    pub regressor: Option<RegressorConfig>,
    pub cv: CrossValidation,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            threshold: ThresholdPolicy::Auto,
            score: AdScore::default(),
            metric: Metric::default(),
            leaf_size: 40,
            regressor: None,
            cv: CrossValidation::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct SimilarityState {
    tree: BallTree,
    threshold: f64,
    /// Nearest-other distance of each training row (empty for one row).
    nearest_other: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct SimilarityDistance {
    params: SimilarityParams,
    state: Option<SimilarityState>,
}

/// Distance of every row of `x` to its nearest other row of the same set.
fn nearest_other(tree: &BallTree, x: ArrayView2<f64>) -> Result<Array1<f64>> {
    if x.nrows() < 2 {
        return Ok(Array1::zeros(0));
    }
    let (dist, _) = tree.query(x, 2)?;
    Ok(dist.column(1).to_owned())
}

fn nearest(tree: &BallTree, x: ArrayView2<f64>) -> Result<Array1<f64>> {
    let (dist, _) = tree.query(x, 1)?;
    Ok(dist.column(0).to_owned())
}

impl SimilarityDistance {
    pub fn new(params: SimilarityParams) -> Result<Self> {
        check_policy("SimilarityDistance", &params.threshold, true)?;
        params.metric.validate()?;
        if params.leaf_size == 0 {
            return Err(AdError::InvalidConfig("leaf_size must be >= 1".to_string()));
        }
        if params.threshold.needs_target() && params.regressor.is_none() {
            return Err(AdError::InvalidConfig(
                "SimilarityDistance threshold 'cv' needs a regressor".to_string(),
            ));
        }
        Ok(Self {
            params,
            state: None,
        })
    }

    pub fn params(&self) -> &SimilarityParams {
        &self.params
    }

    /// Distance from each training row to its nearest other training row.
    pub fn training_distances(&self) -> Option<ArrayView1<'_, f64>> {
        self.state.as_ref().map(|s| s.nearest_other.view())
    }

    fn state(&self) -> Result<&SimilarityState> {
        self.state.as_ref().ok_or(AdError::NotFitted("SimilarityDistance"))
    }
}

impl DomainEstimator for SimilarityDistance {
    fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView1<f64>>) -> Result<()> {
        log::debug!(
            "SimilarityDistance: indexing {} samples x {} descriptors",
            x.nrows(),
            x.ncols()
        );
        let tree = BallTree::new(x, self.params.leaf_size, self.params.metric)?;
        let nearest_other = nearest_other(&tree, x)?;

        let threshold = match self.params.threshold {
            ThresholdPolicy::Fixed(v) => v,
            ThresholdPolicy::Auto => {
                if nearest_other.is_empty() {
                    return Err(AdError::InvalidInput(
                        "automatic distance threshold needs at least two samples".to_string(),
                    ));
                }
                let (mean, std) = mean_std(&nearest_other.to_vec());
                mean + 0.5 * std
            }
            ThresholdPolicy::CrossValidated => {
                let y = require_target("SimilarityDistance", x, y)?;
                let regressor = self.params.regressor.as_ref().ok_or_else(|| {
                    AdError::InvalidConfig(
                        "SimilarityDistance threshold 'cv' needs a regressor".to_string(),
                    )
                })?;
                let (leaf_size, metric) = (self.params.leaf_size, self.params.metric);
                cv_threshold(
                    "SimilarityDistance",
                    x,
                    y,
                    &self.params.cv,
                    self.params.score,
                    |fold| {
                        let fold_tree = BallTree::new(fold.x_train.view(), leaf_size, metric)?;
                        let score = nearest(&fold_tree, fold.x_test.view())?;
                        let mut model = build_regressor(regressor)?;
                        model.fit(fold.x_train.view(), fold.y_train.view())?;
                        Ok((model.predict(fold.x_test.view())?, score))
                    },
                )?
                .threshold
            }
        };

        log::info!("SimilarityDistance threshold: {:.6}", threshold);
        self.state = Some(SimilarityState {
            tree,
            threshold,
            nearest_other,
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
        "SimilarityDistance"
    }
}

impl ScoredDomainEstimator for SimilarityDistance {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        nearest(&self.state()?.tree, x)
    }

    fn threshold(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.threshold)
    }
}
