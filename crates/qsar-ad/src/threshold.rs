//! Threshold search shared by every continuous-score AD estimator.
//!
//! Candidates are the unique values of the pooled out-of-fold outlyingness
//! score, visited in ascending order. The partition only changes at those
//! values, so no grid can do better. Ties in the metric resolve to the last
//! (largest) candidate because improvement is non-strict.
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::config::AdScore;
use crate::error::{check_len, AdError, Result};

/// How a score is compared against the cutoff to decide "in domain".
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    #[default]
    LessEqual,
    Less,
    GreaterEqual,
    Greater,
}

impl Comparison {
    #[inline]
    pub fn in_domain(&self, score: f64, threshold: f64) -> bool {
        match self {
            Comparison::LessEqual => score <= threshold,
            Comparison::Less => score < threshold,
            Comparison::GreaterEqual => score >= threshold,
            Comparison::Greater => score > threshold,
        }
    }

    pub fn apply(&self, score: ArrayView1<f64>, threshold: f64) -> Array1<bool> {
        score.mapv(|s| self.in_domain(s, threshold))
    }
}

/// Outcome of a threshold search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSearch {
    pub threshold: f64,
    /// Metric value reached at `threshold` (0 when no candidate reached the
    /// baseline).
    pub score: f64,
    pub n_candidates: usize,
}

/// Sorted unique values of `score`. NaN is rejected.
pub fn unique_sorted(score: ArrayView1<f64>) -> Result<Vec<f64>> {
    if score.iter().any(|v| v.is_nan()) {
        return Err(AdError::InvalidInput(
            "outlyingness scores contain NaN".to_string(),
        ));
    }
    let mut values = score.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    Ok(values)
}

/// Pick the cutoff maximising `metric` over the pooled out-of-fold arrays.
///
/// Starts from `(threshold 0, score 0)` and moves to any candidate scoring
/// `>=` the best so far; if every candidate scores below 0 the threshold
/// stays at 0.
pub fn optimize_threshold(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    score: ArrayView1<f64>,
    comparison: Comparison,
    metric: AdScore,
) -> Result<ThresholdSearch> {
    check_len("optimize_threshold: y_pred", y_true.len(), y_pred.len())?;
    check_len("optimize_threshold: score", y_true.len(), score.len())?;

    let candidates = unique_sorted(score)?;
    let mut best = ThresholdSearch {
        threshold: 0.0,
        score: 0.0,
        n_candidates: candidates.len(),
    };

    for &z in &candidates {
        let ad = comparison.apply(score, z);
        let value = metric.evaluate(y_true, y_pred, ad.view())?;
        if value >= best.score {
            best.score = value;
            best.threshold = z;
        }
    }

    log::debug!(
        "Threshold search over {} candidates ({}): threshold={} score={:.4}",
        best.n_candidates,
        metric,
        best.threshold,
        best.score
    );
    Ok(best)
}
