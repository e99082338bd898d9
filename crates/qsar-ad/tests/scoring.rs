use ndarray::{array, Array1};
use qsar_ad::config::AdScore;
use qsar_ad::scoring::{balanced_accuracy_score_with_ad, rmse_score_with_ad};
use qsar_ad::stats::rmse;
use qsar_ad::AdError;

// ----------------------------------------------------------------------------
// RMSE difference
// ----------------------------------------------------------------------------

#[test]
fn rmse_score_all_inside_is_minus_rmse_in() {
    let y_true = array![1.0, 2.0, 3.0, 4.0];
    let y_pred = array![1.5, 2.0, 2.0, 4.5];
    let ad = Array1::from_elem(4, true);
    let s = rmse_score_with_ad(y_true.view(), y_pred.view(), ad.view()).unwrap();
    assert!((s + rmse(y_true.view(), y_pred.view())).abs() < 1e-12);
}

#[test]
fn rmse_score_all_outside_is_rmse_out() {
    let y_true = array![1.0, 2.0, 3.0, 4.0];
    let y_pred = array![1.5, 2.0, 2.0, 4.5];
    let ad = Array1::from_elem(4, false);
    let s = rmse_score_with_ad(y_true.view(), y_pred.view(), ad.view()).unwrap();
    assert!((s - rmse(y_true.view(), y_pred.view())).abs() < 1e-12);
}

#[test]
fn rmse_score_rewards_isolating_the_large_errors() {
    let y_true = array![0.0, 0.0, 0.0, 0.0];
    let y_pred = array![0.1, 0.1, 2.0, 2.0];
    let good = array![true, true, false, false];
    let bad = array![false, false, true, true];
    let s_good = rmse_score_with_ad(y_true.view(), y_pred.view(), good.view()).unwrap();
    let s_bad = rmse_score_with_ad(y_true.view(), y_pred.view(), bad.view()).unwrap();
    assert!(s_good > 0.0);
    assert!(s_bad < 0.0);
}

// ----------------------------------------------------------------------------
// Balanced accuracy
// ----------------------------------------------------------------------------

#[test]
fn balanced_accuracy_perfect_partition() {
    // one point with a huge error is the only outlier
    let mut y_true = Array1::zeros(20);
    let mut y_pred = Array1::from_elem(20, 0.1);
    y_true[19] = 0.0;
    y_pred[19] = 10.0;
    let mut ad = Array1::from_elem(20, true);
    ad[19] = false;
    let s = balanced_accuracy_score_with_ad(y_true.view(), y_pred.view(), ad.view()).unwrap();
    assert!((s - 1.0).abs() < 1e-12);
}

#[test]
fn balanced_accuracy_without_outliers_is_inlier_recall() {
    // equal errors: every point is an inlier
    let y_true = array![0.0, 0.0, 0.0, 0.0];
    let y_pred = array![1.0, -1.0, 1.0, -1.0];
    let ad = array![true, true, true, false];
    let s = balanced_accuracy_score_with_ad(y_true.view(), y_pred.view(), ad.view()).unwrap();
    assert!((s - 0.75).abs() < 1e-12);
    assert!(!s.is_nan());
}

#[test]
fn balanced_accuracy_of_empty_input_is_zero() {
    let e = Array1::<f64>::zeros(0);
    let ad = Array1::<bool>::from_elem(0, true);
    assert_eq!(balanced_accuracy_score_with_ad(e.view(), e.view(), ad.view()).unwrap(), 0.0);
}

#[test]
fn metrics_reject_mismatched_lengths() {
    let y = array![1.0, 2.0];
    let ad = array![true];
    for metric in [AdScore::BalancedAccuracy, AdScore::RmseDifference] {
        assert!(matches!(
            metric.evaluate(y.view(), y.view(), ad.view()),
            Err(AdError::ShapeMismatch { .. })
        ));
    }
}
