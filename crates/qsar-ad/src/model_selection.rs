//! K-fold splitting and the out-of-fold driver shared by every
//! cross-validated threshold search.
//!
//! Folds are computed from an explicit `CrossValidation` (fold count and
//! shuffle seed), so repeated runs see identical splits. Each fold is an
//! independent computation over its own row subsets; folds may run on a
//! rayon pool, and their results are always gathered by fold index.
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::{CrossValidation, RegressorConfig};
use crate::error::{check_len, AdError, Result};
use crate::models::factory::build_regressor;

/// Train/test row indices of one fold, both ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled K-fold splitter. The first `n % k` folds hold one extra sample.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
    seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    pub fn from_config(cv: &CrossValidation) -> Self {
        Self::new(cv.n_splits, cv.seed)
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(AdError::InvalidInput(format!(
                "k-fold needs at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > n_samples {
            return Err(AdError::InvalidInput(format!(
                "cannot split {} samples into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let size = base + usize::from(i < extra);
            let mut in_test = vec![false; n_samples];
            for &idx in &indices[start..start + size] {
                in_test[idx] = true;
            }
            let (test, train): (Vec<usize>, Vec<usize>) = (0..n_samples).partition(|&r| in_test[r]);
            folds.push(Fold { train, test });
            start += size;
        }
        Ok(folds)
    }
}

/// Run `op` on a dedicated pool of `n` threads, or on the global rayon pool
/// when `n_jobs` is `None`.
pub(crate) fn install<R, OP>(n_jobs: Option<usize>, op: OP) -> Result<R>
where
    R: Send,
    OP: FnOnce() -> R + Send,
{
    match n_jobs {
        None => Ok(op()),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n.max(1))
                .build()
                .map_err(|e| AdError::InvalidConfig(format!("cannot build thread pool: {}", e)))?;
            Ok(pool.install(op))
        }
    }
}

/// Run `f` once per fold and return the results in fold order.
///
/// `n_jobs == Some(1)` runs sequentially, `Some(n)` uses a dedicated pool of
/// `n` threads, `None` the global rayon pool. The first error aborts the run.
pub fn run_folds<T, F>(folds: &[Fold], n_jobs: Option<usize>, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, &Fold) -> Result<T> + Sync,
{
    if n_jobs == Some(1) {
        return folds.iter().enumerate().map(|(i, fold)| f(i, fold)).collect();
    }
    install(n_jobs, || {
        folds
            .par_iter()
            .enumerate()
            .map(|(i, fold)| f(i, fold))
            .collect()
    })?
}

/// Row subsets handed to a fold callback.
pub struct FoldData<'a> {
    pub index: usize,
    pub fold: &'a Fold,
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

impl<'a> FoldData<'a> {
    pub fn new(x: ArrayView2<f64>, y: ArrayView1<f64>, index: usize, fold: &'a Fold) -> Self {
        Self {
            index,
            fold,
            x_train: x.select(Axis(0), &fold.train),
            y_train: y.select(Axis(0), &fold.train),
            x_test: x.select(Axis(0), &fold.test),
            y_test: y.select(Axis(0), &fold.test),
        }
    }
}

/// Out-of-fold arrays pooled across folds in fold order.
#[derive(Debug, Clone)]
pub struct OutOfFold {
    pub y_true: Array1<f64>,
    pub y_pred: Array1<f64>,
    pub score: Array1<f64>,
    /// Original row index of every pooled entry.
    pub rows: Vec<usize>,
}

/// Cross-validate a scoring callback: for every fold, `f` returns held-out
/// predictions and held-out outlyingness scores, which are concatenated in
/// fold order together with the held-out targets.
pub fn out_of_fold<F>(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    cv: &CrossValidation,
    f: F,
) -> Result<OutOfFold>
where
    F: Fn(&FoldData) -> Result<(Array1<f64>, Array1<f64>)> + Sync,
{
    check_len("out_of_fold: y", x.nrows(), y.len())?;
    let folds = KFold::from_config(cv).split(x.nrows())?;

    let parts = run_folds(&folds, cv.n_jobs, |i, fold| {
        let data = FoldData::new(x, y, i, fold);
        let (y_pred, score) = f(&data)?;
        check_len("out_of_fold: fold predictions", fold.test.len(), y_pred.len())?;
        check_len("out_of_fold: fold scores", fold.test.len(), score.len())?;
        log::trace!(
            "Fold {}: {} train / {} test samples",
            i,
            fold.train.len(),
            fold.test.len()
        );
        Ok((data.y_test, y_pred, score))
    })?;

    let y_true: Vec<ArrayView1<f64>> = parts.iter().map(|p| p.0.view()).collect();
    let y_pred: Vec<ArrayView1<f64>> = parts.iter().map(|p| p.1.view()).collect();
    let score: Vec<ArrayView1<f64>> = parts.iter().map(|p| p.2.view()).collect();
    let concat = |views: &[ArrayView1<f64>]| {
        concatenate(Axis(0), views).map_err(|e| AdError::InvalidInput(e.to_string()))
    };

    Ok(OutOfFold {
        y_true: concat(&y_true)?,
        y_pred: concat(&y_pred)?,
        score: concat(&score)?,
        rows: folds.iter().flat_map(|f| f.test.iter().copied()).collect(),
    })
}

/// Out-of-fold predictions of a fresh regressor per fold, returned in the
/// original row order.
pub fn cross_val_predict(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    regressor: &RegressorConfig,
    cv: &CrossValidation,
) -> Result<Array1<f64>> {
    check_len("cross_val_predict: y", x.nrows(), y.len())?;
    let folds = KFold::from_config(cv).split(x.nrows())?;
    let parts = run_folds(&folds, cv.n_jobs, |i, fold| {
        let data = FoldData::new(x, y, i, fold);
        let mut model = build_regressor(regressor)?;
        model.fit(data.x_train.view(), data.y_train.view())?;
        model.predict(data.x_test.view())
    })?;

    let mut predictions = Array1::zeros(x.nrows());
    for (fold, pred) in folds.iter().zip(parts) {
        for (&row, &value) in fold.test.iter().zip(pred.iter()) {
            predictions[row] = value;
        }
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_partition_every_sample_once() {
        let folds = KFold::new(5, 42).split(23).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 23);
            assert!(fold.train.iter().all(|i| !fold.test.contains(i)));
        }
    }

    #[test]
    fn same_seed_same_folds() {
        let a = KFold::new(5, 3).split(40).unwrap();
        let b = KFold::new(5, 3).split(40).unwrap();
        let c = KFold::new(5, 4).split(40).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_split_counts() {
        assert!(KFold::new(1, 0).split(10).is_err());
        assert!(KFold::new(5, 0).split(4).is_err());
    }

    #[test]
    fn run_folds_keeps_fold_order_in_parallel() {
        let folds = KFold::new(4, 1).split(20).unwrap();
        let out = run_folds(&folds, Some(3), |i, _| Ok(i)).unwrap();
        assert_eq!(out, vec![0, 1, 2, 3]);
    }

    #[test]
    fn run_folds_propagates_errors() {
        let folds = KFold::new(3, 1).split(9).unwrap();
        let out: Result<Vec<usize>> = run_folds(&folds, Some(1), |i, _| {
            if i == 1 {
                Err(AdError::Singular("fold failed".to_string()))
            } else {
                Ok(i)
            }
        });
        assert!(matches!(out, Err(AdError::Singular(_))));
    }
}
