//! Ball tree for exact k-nearest-neighbour queries under Minkowski metrics.
//!
//! Nodes store a centroid and a covering radius; a subtree is skipped when
//! `d(q, centroid) - radius` already exceeds the current k-th best distance,
//! which is valid for any metric obeying the triangle inequality (p >= 1).
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AdError, Result};

/// Distance between descriptor vectors.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
    /// General Minkowski distance, `p >= 1`.
    Minkowski(f64),
}

impl Metric {
    pub fn validate(&self) -> Result<()> {
        match self {
            Metric::Minkowski(p) if !(p.is_finite() && *p >= 1.0) => Err(AdError::InvalidConfig(
                format!("Minkowski p must be finite and >= 1, got {}", p),
            )),
            _ => Ok(()),
        }
    }

    pub fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match *self {
            Metric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Metric::Manhattan => diffs.sum(),
            Metric::Chebyshev => diffs.fold(0.0, f64::max),
            Metric::Minkowski(p) => diffs.map(|d| d.powf(p)).sum::<f64>().powf(1.0 / p),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    start: usize,
    end: usize,
    centroid: Array1<f64>,
    radius: f64,
    children: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct BallTree {
    data: Array2<f64>,
    order: Vec<usize>,
    nodes: Vec<Node>,
    metric: Metric,
}

impl BallTree {
    pub fn new(data: ArrayView2<f64>, leaf_size: usize, metric: Metric) -> Result<Self> {
        metric.validate()?;
        if data.nrows() == 0 {
            return Err(AdError::InvalidInput(
                "cannot build a ball tree over zero samples".to_string(),
            ));
        }
        if leaf_size == 0 {
            return Err(AdError::InvalidConfig("leaf_size must be >= 1".to_string()));
        }

        let mut tree = BallTree {
            data: data.to_owned(),
            order: (0..data.nrows()).collect(),
            nodes: Vec::new(),
            metric,
        };
        tree.build(0, data.nrows(), leaf_size);
        log::trace!(
            "Built ball tree over {} samples with {} nodes",
            tree.data.nrows(),
            tree.nodes.len()
        );
        Ok(tree)
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    fn build(&mut self, start: usize, end: usize, leaf_size: usize) -> usize {
        let members = self.data.select(Axis(0), &self.order[start..end]);
        let centroid = members.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(self.data.ncols()));
        let radius = members
            .rows()
            .into_iter()
            .map(|row| self.metric.distance(row, centroid.view()))
            .fold(0.0, f64::max);

        let node_idx = self.nodes.len();
        self.nodes.push(Node {
            start,
            end,
            centroid,
            radius,
            children: None,
        });

        if end - start <= leaf_size {
            return node_idx;
        }

        // split on the dimension with the widest spread, at the median
        let split_dim = (0..members.ncols())
            .map(|c| {
                let col = members.column(c);
                let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (c, hi - lo)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
            .unwrap_or(0);

        let mid = (end - start) / 2;
        let data = &self.data;
        self.order[start..end].select_nth_unstable_by(mid, |&a, &b| {
            data[(a, split_dim)].total_cmp(&data[(b, split_dim)])
        });

        let left = self.build(start, start + mid, leaf_size);
        let right = self.build(start + mid, end, leaf_size);
        self.nodes[node_idx].children = Some((left, right));
        node_idx
    }

    /// Distances and indices of the `k` nearest training rows of every query
    /// row, sorted by increasing distance.
    pub fn query(&self, x: ArrayView2<f64>, k: usize) -> Result<(Array2<f64>, Array2<usize>)> {
        if k == 0 || k > self.n_samples() {
            return Err(AdError::InvalidInput(format!(
                "k must be in 1..={}, got {}",
                self.n_samples(),
                k
            )));
        }
        if x.ncols() != self.n_features() {
            return Err(AdError::ShapeMismatch {
                context: "BallTree::query: descriptor count",
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }

        let hits: Vec<Vec<(f64, usize)>> = (0..x.nrows())
            .into_par_iter()
            .map(|r| self.query_one(x.row(r), k))
            .collect();

        let mut distances = Array2::zeros((x.nrows(), k));
        let mut indices = Array2::zeros((x.nrows(), k));
        for (r, row_hits) in hits.into_iter().enumerate() {
            for (j, (d, i)) in row_hits.into_iter().enumerate() {
                distances[(r, j)] = d;
                indices[(r, j)] = i;
            }
        }
        Ok((distances, indices))
    }

    fn query_one(&self, q: ArrayView1<f64>, k: usize) -> Vec<(f64, usize)> {
        let mut best: Vec<(f64, usize)> = Vec::with_capacity(k + 1);
        self.search(0, q, k, &mut best);
        best
    }

    fn search(&self, node_idx: usize, q: ArrayView1<f64>, k: usize, best: &mut Vec<(f64, usize)>) {
        let node = &self.nodes[node_idx];
        let lower_bound = (self.metric.distance(q, node.centroid.view()) - node.radius).max(0.0);
        if best.len() == k && lower_bound > best[k - 1].0 {
            return;
        }

        match node.children {
            None => {
                for &i in &self.order[node.start..node.end] {
                    let d = self.metric.distance(q, self.data.row(i));
                    if best.len() < k || d < best[best.len() - 1].0 {
                        let pos = best.partition_point(|&(bd, _)| bd <= d);
                        best.insert(pos, (d, i));
                        best.truncate(k);
                    }
                }
            }
            Some((left, right)) => {
                let dl = self.metric.distance(q, self.nodes[left].centroid.view());
                let dr = self.metric.distance(q, self.nodes[right].centroid.view());
                let (first, second) = if dl <= dr { (left, right) } else { (right, left) };
                self.search(first, q, k, best);
                self.search(second, q, k, best);
            }
        }
    }
}
