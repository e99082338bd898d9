//! Exact Gaussian-process regression with an RBF kernel and white noise.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

use crate::config::GaussianProcessParams;
use crate::error::{check_len, AdError, Result};
use crate::math::{cholesky, cholesky_solve, linalg::solve_lower};
use crate::models::regressor_trait::Regressor;

#[derive(Debug, Clone)]
struct FittedGp {
    x_train: Array2<f64>,
    chol: Array2<f64>,
    alpha: Array1<f64>,
    length_scale: f64,
    log_marginal_likelihood: f64,
}

/// Gaussian-process regressor, `k(a, b) = σ² exp(-|a - b|² / 2l²) + noise·δ`.
///
/// Targets are used as given; callers standardise them when needed.
#[derive(Debug, Clone)]
pub struct GaussianProcessRegressor {
    params: GaussianProcessParams,
    fitted: Option<FittedGp>,
}

fn sq_dist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    Zip::from(&a).and(&b).fold(0.0, |acc, &u, &v| acc + (u - v) * (u - v))
}

fn rbf(a: ArrayView2<f64>, b: ArrayView2<f64>, length_scale: f64, variance: f64) -> Array2<f64> {
    let denom = 2.0 * length_scale * length_scale;
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| {
        variance * (-sq_dist(a.row(i), b.row(j)) / denom).exp()
    })
}

impl GaussianProcessRegressor {
    pub fn new(params: GaussianProcessParams) -> Result<Self> {
        params.validate()?;
        Ok(GaussianProcessRegressor {
            params,
            fitted: None,
        })
    }

    /// Length scale in use after fit (the grid winner when a grid is set).
    pub fn length_scale(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.length_scale)
    }

    pub fn log_marginal_likelihood(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.log_marginal_likelihood)
    }

    fn fit_with(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, length_scale: f64) -> Result<FittedGp> {
        let n = x.nrows();
        let mut k = rbf(x, x, length_scale, self.params.signal_variance);
        for i in 0..n {
            k[(i, i)] += self.params.noise;
        }
        let chol = cholesky(k.view())?;
        let alpha = cholesky_solve(chol.view(), y);
        let log_det: f64 = chol.diag().iter().map(|v| v.ln()).sum();
        let lml = -0.5 * y.dot(&alpha) - log_det - 0.5 * n as f64 * (2.0 * std::f64::consts::PI).ln();
        Ok(FittedGp {
            x_train: x.to_owned(),
            chol,
            alpha,
            length_scale,
            log_marginal_likelihood: lml,
        })
    }

    /// Predictive mean and standard deviation of the latent function.
    pub fn predict_with_std(&self, x: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(AdError::NotFitted("GaussianProcessRegressor"))?;
        check_len(
            "GaussianProcessRegressor::predict: descriptor count",
            fitted.x_train.ncols(),
            x.ncols(),
        )?;
        let k_star = rbf(
            x,
            fitted.x_train.view(),
            fitted.length_scale,
            self.params.signal_variance,
        );
        let mean = k_star.dot(&fitted.alpha);
        let std = k_star
            .rows()
            .into_iter()
            .map(|row| {
                let v = solve_lower(fitted.chol.view(), row);
                (self.params.signal_variance - v.dot(&v)).max(0.0).sqrt()
            })
            .collect();
        Ok((mean, std))
    }
}

impl Regressor for GaussianProcessRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_len("GaussianProcessRegressor::fit: y", x.nrows(), y.len())?;
        if x.nrows() == 0 {
            return Err(AdError::InvalidInput(
                "cannot fit a Gaussian process on zero samples".to_string(),
            ));
        }

        let fitted = if self.params.length_scale_grid.is_empty() {
            self.fit_with(x, y, self.params.length_scale)?
        } else {
            let mut best: Option<FittedGp> = None;
            for &l in &self.params.length_scale_grid {
                let candidate = match self.fit_with(x, y, l) {
                    Ok(c) => c,
                    Err(e) => {
                        log::debug!("GP length scale {} skipped: {}", l, e);
                        continue;
                    }
                };
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.log_marginal_likelihood > b.log_marginal_likelihood)
                {
                    best = Some(candidate);
                }
            }
            best.ok_or_else(|| {
                AdError::Singular("no length scale gave a positive-definite kernel".to_string())
            })?
        };

        log::debug!(
            "GP fitted on {} samples: length_scale={} lml={:.4}",
            x.nrows(),
            fitted.length_scale,
            fitted.log_marginal_likelihood
        );
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_with_std(x).map(|(mean, _)| mean)
    }

    fn name(&self) -> &str {
        "gaussian_process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> GaussianProcessParams {
        GaussianProcessParams {
            length_scale: 1.0,
            signal_variance: 1.0,
            noise: 1e-6,
            length_scale_grid: vec![],
        }
    }

    #[test]
    fn interpolates_training_points() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 0.0, -1.0];
        let mut gp = GaussianProcessRegressor::new(params()).unwrap();
        gp.fit(x.view(), y.view()).unwrap();
        let (mean, std) = gp.predict_with_std(x.view()).unwrap();
        for i in 0..4 {
            assert!((mean[i] - y[i]).abs() < 1e-3);
            assert!(std[i] < 1e-2);
        }
    }

    #[test]
    fn uncertainty_grows_away_from_data() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut gp = GaussianProcessRegressor::new(params()).unwrap();
        gp.fit(x.view(), y.view()).unwrap();
        let (_, std) = gp.predict_with_std(array![[1.5], [20.0]].view()).unwrap();
        assert!(std[1] > std[0]);
        assert!((std[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn grid_picks_a_candidate() {
        let mut p = params();
        p.noise = 1e-2;
        p.length_scale_grid = vec![0.01, 1.0];
        let x = array![[0.0], [0.5], [1.0], [1.5], [2.0]];
        let y = x.column(0).mapv(|v: f64| v.sin());
        let mut gp = GaussianProcessRegressor::new(p).unwrap();
        gp.fit(x.view(), y.view()).unwrap();
        assert_eq!(gp.length_scale(), Some(1.0));
    }

    #[test]
    fn predict_before_fit_fails() {
        let gp = GaussianProcessRegressor::new(params()).unwrap();
        assert!(matches!(
            gp.predict(array![[0.0]].view()),
            Err(AdError::NotFitted(_))
        ));
    }
}
