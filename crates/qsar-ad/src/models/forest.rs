//! Bagged CART regression trees (random forest).
//!
//! Each tree gets its own `StdRng` seeded from the forest seed and the tree
//! index, so a forest is reproducible regardless of how rayon schedules the
//! tree builds. The same forest trained on 0/1 targets serves as the
//! probabilistic classifier.
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::ForestParams;
use crate::error::{check_len, AdError, Result};
use crate::model_selection::install;
use crate::models::regressor_trait::{finite_output, Classifier, Regressor};

/// Trees per accumulation chunk. Fixed so that the summation order, and
/// therefore the result, does not depend on the thread count.
const MEMBER_CHUNK: usize = 8;

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    params: &'a ForestParams,
    n_try: usize,
    nodes: Vec<TreeNode>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(&mut self, idx: &[usize], depth: usize, rng: &mut StdRng) -> usize {
        let n = idx.len() as f64;
        let sum: f64 = idx.iter().map(|&i| self.y[i]).sum();
        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: sum / n });

        let depth_reached = self.params.max_depth.map_or(false, |d| depth >= d);
        if depth_reached || idx.len() < self.params.min_samples_split {
            return node_idx;
        }

        let Some(split) = self.best_split(idx, rng) else {
            return node_idx;
        };

        let left = self.grow(&split.left, depth + 1, rng);
        let right = self.grow(&split.right, depth + 1, rng);
        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    fn best_split(&self, idx: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let mut features = if self.n_try < n_features {
            rand::seq::index::sample(rng, n_features, self.n_try).into_vec()
        } else {
            (0..n_features).collect()
        };
        features.sort_unstable();

        let n = idx.len();
        let total_sum: f64 = idx.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = idx.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        if parent_sse <= 1e-12 {
            return None;
        }

        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<(usize, f64, f64, Vec<usize>, usize)> = None;

        for &f in &features {
            let mut sorted = idx.to_vec();
            sorted.sort_by(|&a, &b| self.x[(a, f)].total_cmp(&self.x[(b, f)]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 0..n - 1 {
                let yi = self.y[sorted[k]];
                left_sum += yi;
                left_sq += yi * yi;
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf {
                    continue;
                }
                if n_right < min_leaf {
                    break;
                }
                let v = self.x[(sorted[k], f)];
                let v_next = self.x[(sorted[k + 1], f)];
                if v == v_next {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);
                let gain = parent_sse - sse;
                if gain > best.as_ref().map_or(1e-12, |b| b.2) {
                    let mut threshold = 0.5 * (v + v_next);
                    if threshold >= v_next {
                        threshold = v;
                    }
                    best = Some((f, threshold, gain, sorted.clone(), n_left));
                }
            }
        }

        best.map(|(feature, threshold, gain, sorted, n_left)| SplitCandidate {
            feature,
            threshold,
            gain,
            left: sorted[..n_left].to_vec(),
            right: sorted[n_left..].to_vec(),
        })
        .filter(|s| s.gain > 0.0)
    }
}

impl RegressionTree {
    fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let n = x.nrows();
        let idx: Vec<usize> = if params.bootstrap {
            (0..n).map(|_| rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        };
        let n_try = ((params.max_features * x.ncols() as f64).ceil() as usize).clamp(1, x.ncols().max(1));

        let mut builder = TreeBuilder {
            x: x.reborrow(),
            y: y.reborrow(),
            params,
            n_try,
            nodes: Vec::new(),
        };
        builder.grow(&idx, 0, rng);
        RegressionTree {
            nodes: builder.nodes,
        }
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Random forest regressor built from `ForestParams`.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    params: ForestParams,
    trees: Vec<RegressionTree>,
    n_features: Option<usize>,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            trees: Vec::new(),
            n_features: None,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    fn check_fitted(&self, x: ArrayView2<f64>) -> Result<()> {
        let Some(n_features) = self.n_features else {
            return Err(AdError::NotFitted("RandomForestRegressor"));
        };
        check_len("RandomForestRegressor: descriptor count", n_features, x.ncols())
    }

    /// Mean and population standard deviation of the per-tree predictions.
    ///
    /// Trees are processed in fixed-size chunks; each chunk accumulates the
    /// running sum and sum of squares of its members' predictions, and the
    /// chunk partials are reduced in chunk order. No per-tree prediction
    /// array outlives its chunk.
    pub fn predict_moments(&self, x: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        self.check_fitted(x)?;
        let n = x.nrows();
        let partials: Vec<(Array1<f64>, Array1<f64>)> = install(self.params.n_jobs, || {
            self.trees
                .par_chunks(MEMBER_CHUNK)
                .map(|chunk| {
                    let mut sum = Array1::<f64>::zeros(n);
                    let mut sum_sq = Array1::<f64>::zeros(n);
                    for tree in chunk {
                        let pred = tree.predict(x);
                        sum += &pred;
                        sum_sq += &pred.mapv(|p| p * p);
                    }
                    (sum, sum_sq)
                })
                .collect()
        })?;

        let mut sum = Array1::<f64>::zeros(n);
        let mut sum_sq = Array1::<f64>::zeros(n);
        for (s, sq) in &partials {
            sum += s;
            sum_sq += sq;
        }
        let m = self.trees.len() as f64;
        let mean = finite_output("random_forest", sum / m)?;
        let mean_sq = sum_sq / m;
        let std = ndarray::Zip::from(&mean_sq)
            .and(&mean)
            .map_collect(|&sq, &mu| (sq - mu * mu).max(0.0).sqrt());
        Ok((mean, std))
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_len("RandomForestRegressor::fit: y", x.nrows(), y.len())?;
        if x.nrows() == 0 {
            return Err(AdError::InvalidInput(
                "cannot fit a forest on zero samples".to_string(),
            ));
        }
        let params = self.params;
        let trees = install(params.n_jobs, || {
            (0..params.n_estimators)
                .into_par_iter()
                .map(|t| {
                    let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, t));
                    RegressionTree::fit(x, y, &params, &mut rng)
                })
                .collect::<Vec<_>>()
        })?;
        log::trace!(
            "Fitted random forest with {} trees on {} samples",
            trees.len(),
            x.nrows()
        );
        self.trees = trees;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_moments(x)?.0)
    }

    fn name(&self) -> &str {
        "random_forest"
    }
}

/// Forest of regression trees on 0/1 labels; the mean leaf value is the
/// probability of the positive class.
#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    forest: RandomForestRegressor,
}

impl RandomForestClassifier {
    pub fn new(params: ForestParams) -> Result<Self> {
        Ok(Self {
            forest: RandomForestRegressor::new(params)?,
        })
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[bool]) -> Result<()> {
        let targets: Array1<f64> = y.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        self.forest.fit(x, targets.view())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.forest.predict(x)?.mapv(|p| p.clamp(0.0, 1.0)))
    }

    fn name(&self) -> &str {
        "random_forest_classifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| if v < 20.0 { 1.0 } else { 5.0 });
        (x, y)
    }

    #[test]
    fn single_tree_without_bootstrap_fits_a_step() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 1,
            bootstrap: false,
            ..ForestParams::default()
        };
        let mut forest = RandomForestRegressor::new(params).unwrap();
        forest.fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(array![[3.0, 0.0], [35.0, 1.0]].view()).unwrap();
        assert_eq!(pred, array![1.0, 5.0]);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 20,
            max_features: 0.5,
            ..ForestParams::default()
        };
        let mut a = RandomForestRegressor::new(params).unwrap();
        let mut b = RandomForestRegressor::new(ForestParams { n_jobs: Some(1), ..params }).unwrap();
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        let (ma, sa) = a.predict_moments(x.view()).unwrap();
        let (mb, sb) = b.predict_moments(x.view()).unwrap();
        assert_eq!(ma, mb);
        assert_eq!(sa, sb);
    }

    #[test]
    fn member_spread_is_zero_for_identical_trees() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 5,
            bootstrap: false,
            ..ForestParams::default()
        };
        let mut forest = RandomForestRegressor::new(params).unwrap();
        forest.fit(x.view(), y.view()).unwrap();
        let (_, std) = forest.predict_moments(x.view()).unwrap();
        assert!(std.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn nan_target_surfaces_as_model_error() {
        let (x, mut y) = step_data();
        y[4] = f64::NAN;
        let params = ForestParams {
            n_estimators: 3,
            bootstrap: false,
            ..ForestParams::default()
        };
        let mut forest = RandomForestRegressor::new(params).unwrap();
        forest.fit(x.view(), y.view()).unwrap();
        assert!(matches!(forest.predict(x.view()), Err(AdError::Model(_))));
    }

    #[test]
    fn predict_before_fit_fails() {
        let forest = RandomForestRegressor::new(ForestParams::default()).unwrap();
        assert!(matches!(
            forest.predict(array![[1.0]].view()),
            Err(AdError::NotFitted(_))
        ));
    }

    #[test]
    fn classifier_probabilities_in_unit_interval() {
        let (x, y) = step_data();
        let labels: Vec<bool> = y.iter().map(|&v| v < 3.0).collect();
        let mut clf = RandomForestClassifier::new(ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        })
        .unwrap();
        clf.fit(x.view(), &labels).unwrap();
        let proba = clf.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(proba[0] > 0.5 && proba[39] < 0.5);
    }
}
