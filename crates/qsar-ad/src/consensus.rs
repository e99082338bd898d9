//! Combination of AD verdicts and the per-method comparison table.
use ndarray::{Array1, ArrayView1, Zip};
use serde::Serialize;

use crate::error::{check_len, AdError, Result};
use crate::stats::{iap, masked_r2, masked_rmse, r2_score, reliable_mask, rmse, roc_auc, ConfusionMatrix};

/// Suffix appended to a method combined with reaction-type control.
pub const RTC_SUFFIX: &str = "+RTC";

/// A named AD verdict, with the outlyingness score that produced it when
/// there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodVerdict {
    pub name: String,
    pub verdict: Array1<bool>,
    pub score: Option<Array1<f64>>,
}

impl MethodVerdict {
    pub fn new(name: impl Into<String>, verdict: Array1<bool>) -> Self {
        Self {
            name: name.into(),
            verdict,
            score: None,
        }
    }

    pub fn with_score(mut self, score: Array1<f64>) -> Self {
        self.score = Some(score);
        self
    }
}

/// Element-wise AND: in domain only where every verdict agrees.
pub fn combine_and(verdicts: &[ArrayView1<bool>]) -> Result<Array1<bool>> {
    let (first, rest) = verdicts.split_first().ok_or_else(|| {
        AdError::InvalidInput("combine_and needs at least one verdict".to_string())
    })?;
    let mut out = first.to_owned();
    for v in rest {
        check_len("combine_and: verdict length", out.len(), v.len())?;
        Zip::from(&mut out).and(v).for_each(|o, &b| *o = *o && b);
    }
    Ok(out)
}

/// Combine each verdict with the structural (reaction-type) verdict.
///
/// Returns, in order, every method ANDed with `rtc` (named `<name>+RTC`),
/// the plain `RTC` verdict, and the AND of all methods and `rtc`
/// (`Consensus+RTC`).
pub fn combine_with_structural(
    verdicts: &[MethodVerdict],
    rtc: ArrayView1<bool>,
) -> Result<Vec<MethodVerdict>> {
    let mut out = Vec::with_capacity(verdicts.len() + 2);
    for m in verdicts {
        let combined = combine_and(&[m.verdict.view(), rtc.reborrow()])?;
        out.push(MethodVerdict::new(format!("{}{}", m.name, RTC_SUFFIX), combined));
    }
    out.push(MethodVerdict::new("RTC", rtc.to_owned()));

    let mut all: Vec<ArrayView1<bool>> = verdicts.iter().map(|m| m.verdict.view()).collect();
    all.push(rtc.reborrow());
    out.push(MethodVerdict::new(
        format!("Consensus{}", RTC_SUFFIX),
        combine_and(&all)?,
    ));
    Ok(out)
}

/// Prediction-quality summary of one AD method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodReport {
    pub name: String,
    /// Fraction of rows flagged in domain.
    pub coverage: f64,
    pub r2_no_ad: f64,
    pub r2_in_ad: f64,
    pub r2_out_ad: f64,
    /// `r2_in_ad - r2_no_ad`
    pub delta_r2_in: f64,
    /// `r2_in_ad - r2_out_ad`
    pub delta_r2_in_out: f64,
    pub rmse_no_ad: f64,
    pub rmse_in_ad: f64,
    pub rmse_out_ad: f64,
    /// `rmse_no_ad - rmse_in_ad`
    pub delta_rmse_in: f64,
    /// `rmse_out_ad - rmse_in_ad`
    pub delta_rmse_out_in: f64,
    /// In-domain as the positive prediction, reliable as the positive label.
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
    pub accuracy: f64,
    pub sensitivity: f64,
    pub specificity: f64,
    pub ppv: f64,
    pub npv: f64,
    pub f1: f64,
    pub f05: f64,
    pub f2: f64,
    pub balanced_accuracy: f64,
    pub iap: f64,
    /// ROC AUC of the outlyingness score for detecting unreliable rows.
    pub auc: f64,
}

fn report_one(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    reliable: &[bool],
    abs_error: &Array1<f64>,
    method: &MethodVerdict,
) -> Result<MethodReport> {
    let n = y_true.len();
    check_len("compare_methods: verdict length", n, method.verdict.len())?;
    let ad = method.verdict.view();

    let r2_no_ad = r2_score(y_true, y_pred);
    let r2_in_ad = masked_r2(y_true, y_pred, ad, true);
    let r2_out_ad = masked_r2(y_true, y_pred, ad, false);
    let rmse_no_ad = rmse(y_true, y_pred);
    let rmse_in_ad = masked_rmse(y_true, y_pred, ad, true);
    let rmse_out_ad = masked_rmse(y_true, y_pred, ad, false);

    let cm = ConfusionMatrix::from_labels(reliable, &method.verdict.to_vec());
    let covered = method.verdict.iter().filter(|&&v| v).count();
    let coverage = if n == 0 { 0.0 } else { covered as f64 / n as f64 };

    let unreliable: Vec<bool> = reliable.iter().map(|&r| !r).collect();
    let auc = match &method.score {
        Some(score) => {
            check_len("compare_methods: score length", n, score.len())?;
            roc_auc(score.view(), &unreliable)
        }
        None => {
            let negated = method.verdict.mapv(|v| if v { 0.0 } else { 1.0 });
            roc_auc(negated.view(), &unreliable)
        }
    };

    Ok(MethodReport {
        name: method.name.clone(),
        coverage,
        r2_no_ad,
        r2_in_ad,
        r2_out_ad,
        delta_r2_in: r2_in_ad - r2_no_ad,
        delta_r2_in_out: r2_in_ad - r2_out_ad,
        rmse_no_ad,
        rmse_in_ad,
        rmse_out_ad,
        delta_rmse_in: rmse_no_ad - rmse_in_ad,
        delta_rmse_out_in: rmse_out_ad - rmse_in_ad,
        tp: cm.tp,
        fp: cm.fp,
        tn: cm.tn,
        fn_: cm.fn_,
        accuracy: cm.accuracy(),
        sensitivity: cm.sensitivity(),
        specificity: cm.specificity(),
        ppv: cm.ppv(),
        npv: cm.npv(),
        f1: cm.f_beta(1.0),
        f05: cm.f_beta(0.5),
        f2: cm.f_beta(2.0),
        balanced_accuracy: cm.balanced_accuracy(),
        iap: iap(abs_error.view(), ad),
        auc,
    })
}

/// One report per method, in input order. The reliable label is
/// `|y_true - y_pred| <= 3 * RMSE` over all rows.
pub fn compare_methods(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    methods: &[MethodVerdict],
) -> Result<Vec<MethodReport>> {
    check_len("compare_methods: y_pred", y_true.len(), y_pred.len())?;
    let reliable = reliable_mask(y_true, y_pred);
    let abs_error = Zip::from(&y_true)
        .and(&y_pred)
        .map_collect(|&t, &p| (t - p).abs());

    let reports = methods
        .iter()
        .map(|m| report_one(y_true, y_pred, &reliable, &abs_error, m))
        .collect::<Result<Vec<_>>>()?;
    log::debug!("Compared {} AD methods on {} samples", reports.len(), y_true.len());
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn and_rejects_length_mismatch_and_empty_input() {
        let a = array![true, false];
        let b = array![true];
        assert!(combine_and(&[a.view(), b.view()]).is_err());
        assert!(combine_and(&[]).is_err());
    }

    #[test]
    fn structural_combination_names() {
        let m = MethodVerdict::new("Leverage", array![true, true, false]);
        let rtc = array![true, false, true];
        let out = combine_with_structural(&[m], rtc.view()).unwrap();
        let names: Vec<&str> = out.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Leverage+RTC", "RTC", "Consensus+RTC"]);
        assert_eq!(out[0].verdict.to_vec(), vec![true, false, false]);
    }

    #[test]
    fn empty_ad_reports_zeros() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.1, 2.1, 2.9, 4.2];
        let m = MethodVerdict::new("none", array![false, false, false, false]);
        let r = &compare_methods(y_true.view(), y_pred.view(), &[m]).unwrap()[0];
        assert_eq!(r.coverage, 0.0);
        assert_eq!(r.r2_in_ad, 0.0);
        assert_eq!(r.rmse_in_ad, 0.0);
        assert_eq!(r.ppv, 0.0);
        assert_eq!(r.iap, 0.0);
        assert!(r.auc.is_finite());
    }
}
