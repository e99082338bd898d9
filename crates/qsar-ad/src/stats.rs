//! Descriptive statistics and prediction-quality metrics.
//!
//! All functions here return `0.0` for any quantity whose denominator is
//! zero (empty subsets, constant targets, missing classes) instead of
//! producing `NaN`, so their results can be compared safely.
use ndarray::{ArrayView1, Zip};
use statrs::statistics::Statistics;

/// Root mean squared error. Empty input gives 0.
pub fn rmse(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let sse = Zip::from(&y_true)
        .and(&y_pred)
        .fold(0.0, |acc, &t, &p| acc + (t - p).powi(2));
    (sse / y_true.len() as f64).sqrt()
}

/// RMSE over the rows where `mask` equals `keep`.
pub fn masked_rmse(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    mask: ArrayView1<bool>,
    keep: bool,
) -> f64 {
    let mut sse = 0.0;
    let mut n = 0usize;
    for ((&t, &p), &m) in y_true.iter().zip(y_pred.iter()).zip(mask.iter()) {
        if m == keep {
            sse += (t - p).powi(2);
            n += 1;
        }
    }
    if n == 0 {
        0.0
    } else {
        (sse / n as f64).sqrt()
    }
}

/// Coefficient of determination. Returns 0 for fewer than two samples or a
/// constant target.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    if y_true.len() < 2 {
        return 0.0;
    }
    let mean = y_true.iter().mean();
    let ss_tot: f64 = y_true.iter().map(|&t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| (t - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// R² over the rows where `mask` equals `keep`.
pub fn masked_r2(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    mask: ArrayView1<bool>,
    keep: bool,
) -> f64 {
    let (t, p): (Vec<f64>, Vec<f64>) = y_true
        .iter()
        .zip(y_pred.iter())
        .zip(mask.iter())
        .filter(|(_, &m)| m == keep)
        .map(|((&t, &p), _)| (t, p))
        .unzip();
    r2_score(ArrayView1::from(&t), ArrayView1::from(&p))
}

/// Population mean and standard deviation (`ddof = 0`).
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().mean();
    let std = values.iter().population_std_dev();
    (mean, if std.is_finite() { std } else { 0.0 })
}

/// Reliability label: `true` when the absolute error is within three RMSE
/// of the whole population.
pub fn reliable_mask(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Vec<bool> {
    let limit = 3.0 * rmse(y_true, y_pred);
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| (t - p).abs() <= limit)
        .collect()
}

/// Binary confusion matrix with an explicit positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ConfusionMatrix {
    /// Count outcomes with `true` as the positive class in both vectors.
    pub fn from_labels(actual: &[bool], predicted: &[bool]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            match (a, p) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Recall of the positive class (TPR).
    pub fn sensitivity(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Recall of the negative class (TNR).
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn ppv(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn npv(&self) -> f64 {
        ratio(self.tn, self.tn + self.fn_)
    }

    /// F-beta score of the positive class; 0 when precision and recall are
    /// both 0.
    pub fn f_beta(&self, beta: f64) -> f64 {
        let precision = self.ppv();
        let recall = self.sensitivity();
        let b2 = beta * beta;
        let den = b2 * precision + recall;
        if den == 0.0 {
            0.0
        } else {
            (1.0 + b2) * precision * recall / den
        }
    }

    /// Mean recall over the classes present in `actual`. A class without
    /// members is left out of the average; with no members at all the
    /// score is 0.
    pub fn balanced_accuracy(&self) -> f64 {
        let mut recalls = Vec::with_capacity(2);
        if self.tp + self.fn_ > 0 {
            recalls.push(self.sensitivity());
        }
        if self.tn + self.fp > 0 {
            recalls.push(self.specificity());
        }
        if recalls.is_empty() {
            0.0
        } else {
            recalls.iter().sum::<f64>() / recalls.len() as f64
        }
    }
}

/// Invariant accuracy of prediction: probability that a randomly chosen
/// in-domain sample has a smaller absolute error than a randomly chosen
/// out-of-domain sample. Ties count one half.
pub fn iap(abs_error: ArrayView1<f64>, in_domain: ArrayView1<bool>) -> f64 {
    let inside: Vec<f64> = abs_error
        .iter()
        .zip(in_domain.iter())
        .filter(|(_, &m)| m)
        .map(|(&e, _)| e)
        .collect();
    let outside: Vec<f64> = abs_error
        .iter()
        .zip(in_domain.iter())
        .filter(|(_, &m)| !m)
        .map(|(&e, _)| e)
        .collect();
    if inside.is_empty() || outside.is_empty() {
        return 0.0;
    }
    let mut wins = 0.0;
    for &i in &inside {
        for &o in &outside {
            if i < o {
                wins += 1.0;
            } else if i == o {
                wins += 0.5;
            }
        }
    }
    wins / (inside.len() * outside.len()) as f64
}

/// Area under the ROC curve of `score` for detecting `positive` samples,
/// via the rank-sum statistic with average ranks for ties. Returns 0 when
/// either class is empty.
pub fn roc_auc(score: ArrayView1<f64>, positive: &[bool]) -> f64 {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..score.len()).collect();
    order.sort_by(|&a, &b| score[a].total_cmp(&score[b]));

    let mut ranks = vec![0.0; score.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && score[order[j + 1]] == score[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = ranks
        .iter()
        .zip(positive.iter())
        .filter(|(_, &p)| p)
        .map(|(&r, _)| r)
        .sum();
    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}
