use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};

use crate::domain::DomainEstimator;
use crate::error::{check_len, AdError, Result};

#[derive(Debug, Clone)]
struct Bounds {
    min: Array1<f64>,
    max: Array1<f64>,
}

/// Per-descriptor `[min, max]` box of the training set, inclusive.
/// The default AD when nothing else is configured.
#[derive(Debug, Clone, Default)]
pub struct BoundingBox {
    bounds: Option<Bounds>,
}

impl BoundingBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(&self) -> Option<ArrayView1<'_, f64>> {
        self.bounds.as_ref().map(|b| b.min.view())
    }

    pub fn max(&self) -> Option<ArrayView1<'_, f64>> {
        self.bounds.as_ref().map(|b| b.max.view())
    }
}

impl DomainEstimator for BoundingBox {
    fn fit(&mut self, x: ArrayView2<f64>, _y: Option<ArrayView1<f64>>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(AdError::InvalidInput(
                "cannot fit a bounding box on zero samples".to_string(),
            ));
        }
        let min = x.fold_axis(Axis(0), f64::INFINITY, |m, &v| m.min(v));
        let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |m, &v| m.max(v));
        log::debug!("Bounding box fitted on {} x {}", x.nrows(), x.ncols());
        self.bounds = Some(Bounds { min, max });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<bool>> {
        let bounds = self.bounds.as_ref().ok_or(AdError::NotFitted("BoundingBox"))?;
        check_len("BoundingBox::predict: descriptor count", bounds.min.len(), x.ncols())?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                Zip::from(&row)
                    .and(&bounds.min)
                    .and(&bounds.max)
                    .fold(true, |inside, &v, &lo, &hi| inside && v >= lo && v <= hi)
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.bounds.is_some()
    }

    fn name(&self) -> &'static str {
        "BoundingBox"
    }
}
