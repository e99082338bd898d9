//! Small preprocessing utilities shared by the models and AD estimators.
//!
//! Provides a standard scaler (per-column mean/std) for descriptor
//! matrices and a 1-D variant for target vectors, both with an inverse
//! transform so standardised predictions can be mapped back.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{check_len, AdError, Result};

/// Minimum stddev to avoid division by zero when transforming.
const MIN_STD: f64 = 1e-12;

/// Per-column mean/std standard scaler.
#[derive(Clone, Debug)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl StandardScaler {
    /// Fit from a matrix where rows are samples and columns are descriptors.
    /// Uses the population standard deviation.
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            AdError::InvalidInput("cannot fit a scaler on zero samples".to_string())
        })?;
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| s.max(MIN_STD));
        Ok(StandardScaler { mean, std })
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_len("StandardScaler::transform: descriptor count", self.mean.len(), x.ncols())?;
        Ok((&x - &self.mean) / &self.std)
    }

    pub fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_len("StandardScaler::inverse_transform: descriptor count", self.mean.len(), x.ncols())?;
        Ok(&x * &self.std + &self.mean)
    }

    pub fn fit_transform(x: ArrayView2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let out = scaler.transform(x)?;
        Ok((scaler, out))
    }
}

/// Zero-mean, unit-variance scaler for a target vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetScaler {
    pub mean: f64,
    pub std: f64,
}

impl TargetScaler {
    pub fn fit(y: ArrayView1<f64>) -> Result<Self> {
        let mean = y.mean().ok_or_else(|| {
            AdError::InvalidInput("cannot fit a scaler on an empty target".to_string())
        })?;
        let std = y.std(0.0).max(MIN_STD);
        Ok(TargetScaler { mean, std })
    }

    pub fn transform(&self, y: ArrayView1<f64>) -> Array1<f64> {
        y.mapv(|v| (v - self.mean) / self.std)
    }

    pub fn inverse_transform(&self, y: ArrayView1<f64>) -> Array1<f64> {
        y.mapv(|v| v * self.std + self.mean)
    }
}
