//! Scores that rate how well a boolean AD partition separates well-predicted
//! samples from badly-predicted ones. Both are maximised by a good AD.
use ndarray::ArrayView1;

use crate::config::AdScore;
use crate::error::{check_len, Result};
use crate::stats::{masked_rmse, reliable_mask, ConfusionMatrix};

/// Balanced accuracy of the AD partition against the inlier label
/// `|y_true - y_pred| <= 3 * RMSE`.
///
/// When the label has a single class (every sample is an inlier, or none
/// is) the recall of the missing class is undefined and left out of the
/// mean, so the score reduces to the recall of the class that is present.
pub fn balanced_accuracy_score_with_ad(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    ad: ArrayView1<bool>,
) -> Result<f64> {
    check_len("balanced_accuracy_score_with_ad: y_pred", y_true.len(), y_pred.len())?;
    check_len("balanced_accuracy_score_with_ad: ad", y_true.len(), ad.len())?;

    let inliers = reliable_mask(y_true, y_pred);
    let ad: Vec<bool> = ad.to_vec();
    Ok(ConfusionMatrix::from_labels(&inliers, &ad).balanced_accuracy())
}

/// `RMSE(outside AD) - RMSE(inside AD)`. An empty side contributes 0.
pub fn rmse_score_with_ad(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    ad: ArrayView1<bool>,
) -> Result<f64> {
    check_len("rmse_score_with_ad: y_pred", y_true.len(), y_pred.len())?;
    check_len("rmse_score_with_ad: ad", y_true.len(), ad.len())?;

    let outside = masked_rmse(y_true, y_pred, ad, false);
    let inside = masked_rmse(y_true, y_pred, ad, true);
    Ok(outside - inside)
}

impl AdScore {
    pub fn evaluate(
        &self,
        y_true: ArrayView1<f64>,
        y_pred: ArrayView1<f64>,
        ad: ArrayView1<bool>,
    ) -> Result<f64> {
        match self {
            AdScore::BalancedAccuracy => balanced_accuracy_score_with_ad(y_true, y_pred, ad),
            AdScore::RmseDifference => rmse_score_with_ad(y_true, y_pred, ad),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn ba_rewards_isolating_the_outlier() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut y_pred = y_true.clone();
        y_pred[11] += 50.0;
        let good = array![true, true, true, true, true, true, true, true, true, true, true, false];
        let all_in = Array1::from_elem(12, true);
        let ba_good = balanced_accuracy_score_with_ad(y_true.view(), y_pred.view(), good.view()).unwrap();
        let ba_all = balanced_accuracy_score_with_ad(y_true.view(), y_pred.view(), all_in.view()).unwrap();
        assert!((ba_good - 1.0).abs() < 1e-12);
        assert!((ba_all - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ba_without_outliers_is_inlier_recall() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.1, 2.1, 2.9, 4.0];
        let ad = array![true, true, false, false];
        let ba = balanced_accuracy_score_with_ad(y_true.view(), y_pred.view(), ad.view()).unwrap();
        assert!((ba - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rmse_difference_sign() {
        let y_true = array![0.0, 0.0, 0.0, 0.0];
        let y_pred = array![0.0, 0.0, 2.0, 2.0];
        let ad = array![true, true, false, false];
        let s = rmse_score_with_ad(y_true.view(), y_pred.view(), ad.view()).unwrap();
        assert!((s - 2.0).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let y = array![1.0, 2.0];
        let ad = array![true];
        assert!(AdScore::RmseDifference.evaluate(y.view(), y.view(), ad.view()).is_err());
    }
}
