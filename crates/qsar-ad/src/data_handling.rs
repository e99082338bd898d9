//! Aligned container for a descriptor matrix, its target vector and the
//! per-row / per-column labels carried along with them.
use ndarray::{Array1, Array2, Axis};

use crate::error::{check_len, Result};

#[derive(Debug, Clone)]
pub struct DescriptorSet {
    /// Rows are samples, columns are descriptors.
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Precomputed reaction signatures, when the source provides them.
    pub signatures: Option<Vec<String>>,
}

impl DescriptorSet {
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        feature_names: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        check_len("DescriptorSet: y", x.nrows(), y.len())?;
        check_len("DescriptorSet: feature_names", x.ncols(), feature_names.len())?;
        check_len("DescriptorSet: sample_ids", x.nrows(), sample_ids.len())?;
        Ok(Self {
            x,
            y,
            feature_names,
            sample_ids,
            signatures: None,
        })
    }

    pub fn with_signatures(mut self, signatures: Vec<String>) -> Result<Self> {
        check_len("DescriptorSet: signatures", self.x.nrows(), signatures.len())?;
        self.signatures = Some(signatures);
        Ok(self)
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Rows `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
            sample_ids: indices.iter().map(|&i| self.sample_ids[i].clone()).collect(),
            signatures: self
                .signatures
                .as_ref()
                .map(|s| indices.iter().map(|&i| s[i].clone()).collect()),
        }
    }

    pub fn log_summary(&self) {
        log::info!(
            "Descriptor set: {} samples x {} descriptors",
            self.n_samples(),
            self.n_features()
        );
        if let (Some(min), Some(max)) = (
            self.y.iter().copied().reduce(f64::min),
            self.y.iter().copied().reduce(f64::max),
        ) {
            log::info!("Target range: [{:.4}, {:.4}]", min, max);
        }
        if let Some(signatures) = &self.signatures {
            let mut distinct: Vec<&String> = signatures.iter().collect();
            distinct.sort();
            distinct.dedup();
            log::info!("{} distinct reaction signatures", distinct.len());
        }
    }
}
