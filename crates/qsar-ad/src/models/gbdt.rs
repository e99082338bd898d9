use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{check_len, AdError, Result};
use crate::models::regressor_trait::{finite_output, Classifier, Regressor};

/// Settings shared by the boosted regressor and classifier.
#[derive(Debug, Clone, Copy)]
pub struct GbdtParams {
    pub learning_rate: f32,
    pub max_depth: u32,
    pub num_boost_round: u32,
    pub min_leaf_size: usize,
    pub training_optimization_level: u8,
}

impl GbdtParams {
    fn config(&self, feature_size: usize, loss: &str) -> Config {
        let mut config = Config::new();
        config.set_feature_size(feature_size);
        config.set_shrinkage(self.learning_rate);
        config.set_max_depth(self.max_depth);
        config.set_iterations(self.num_boost_round as usize);
        config.set_min_leaf_size(self.min_leaf_size.max(1));
        config.set_debug(false);
        config.set_training_optimization_level(self.training_optimization_level);
        config.set_loss(loss);
        config
    }
}

fn to_training_data(x: ArrayView2<f64>, labels: impl Iterator<Item = f32>) -> DataVec {
    x.rows()
        .into_iter()
        .zip(labels)
        .map(|(row, label)| {
            let features = row.iter().map(|&v| v as f32).collect();
            Data::new_training_data(features, 1.0, label, None)
        })
        .collect()
}

fn to_test_data(x: ArrayView2<f64>) -> DataVec {
    x.rows()
        .into_iter()
        .map(|row| Data::new_test_data(row.iter().map(|&v| v as f32).collect(), None))
        .collect()
}

/// Gradient Boosting Decision Tree (GBDT) regressor, squared-error loss.
pub struct GbdtRegressor {
    model: Option<GBDT>,
    params: GbdtParams,
    n_features: usize,
}

impl GbdtRegressor {
    pub fn new(params: GbdtParams) -> Self {
        GbdtRegressor {
            model: None,
            params,
            n_features: 0,
        }
    }
}

impl Regressor for GbdtRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_len("GbdtRegressor::fit: y", x.nrows(), y.len())?;
        if x.nrows() == 0 {
            return Err(AdError::InvalidInput("cannot fit GBDT on zero samples".to_string()));
        }
        let config = self.params.config(x.ncols(), "SquaredError");
        let mut gbdt = GBDT::new(&config);
        let mut train_x = to_training_data(x, y.iter().map(|&v| v as f32));
        gbdt.fit(&mut train_x);

        self.model = Some(gbdt);
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(AdError::NotFitted("GbdtRegressor"))?;
        check_len("GbdtRegressor::predict: descriptor count", self.n_features, x.ncols())?;
        let predictions = model.predict(&to_test_data(x));
        finite_output(self.name(), predictions.into_iter().map(f64::from).collect())
    }

    fn name(&self) -> &str {
        "gbdt"
    }
}

/// GBDT classifier with the log-likelihood loss. Labels are mapped to
/// `+1` (positive) / `-1` (negative), and the boosted margin is turned into
/// `P(positive)` by the library.
pub struct GbdtClassifier {
    model: Option<GBDT>,
    params: GbdtParams,
    n_features: usize,
    /// Set when the training labels had a single class.
    constant: Option<f64>,
}

impl GbdtClassifier {
    pub fn new(params: GbdtParams) -> Self {
        GbdtClassifier {
            model: None,
            params,
            n_features: 0,
            constant: None,
        }
    }
}

impl Classifier for GbdtClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[bool]) -> Result<()> {
        check_len("GbdtClassifier::fit: y", x.nrows(), y.len())?;
        if x.nrows() == 0 {
            return Err(AdError::InvalidInput("cannot fit GBDT on zero samples".to_string()));
        }
        self.n_features = x.ncols();

        let n_pos = y.iter().filter(|&&l| l).count();
        if n_pos == 0 || n_pos == y.len() {
            log::debug!("GBDT classifier trained on a single class; predicting a constant");
            self.constant = Some(if n_pos == 0 { 0.0 } else { 1.0 });
            self.model = None;
            return Ok(());
        }

        let config = self.params.config(x.ncols(), "LogLikelyhood");
        let mut gbdt = GBDT::new(&config);
        let mut train_x = to_training_data(x, y.iter().map(|&l| if l { 1.0 } else { -1.0 }));
        gbdt.fit(&mut train_x);

        self.model = Some(gbdt);
        self.constant = None;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if let Some(p) = self.constant {
            check_len("GbdtClassifier::predict_proba: descriptor count", self.n_features, x.ncols())?;
            return Ok(Array1::from_elem(x.nrows(), p));
        }
        let model = self.model.as_ref().ok_or(AdError::NotFitted("GbdtClassifier"))?;
        check_len("GbdtClassifier::predict_proba: descriptor count", self.n_features, x.ncols())?;
        let proba = finite_output(
            self.name(),
            model.predict(&to_test_data(x)).into_iter().map(f64::from).collect(),
        )?;
        Ok(proba.mapv(|p| p.clamp(0.0, 1.0)))
    }

    fn name(&self) -> &str {
        "gbdt_classifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn params() -> GbdtParams {
        GbdtParams {
            learning_rate: 0.3,
            max_depth: 3,
            num_boost_round: 30,
            min_leaf_size: 1,
            training_optimization_level: 2,
        }
    }

    #[test]
    fn gbdt_regressor_follows_a_line() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| 2.0 * v);
        let mut model = GbdtRegressor::new(params());
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        assert_eq!(pred.len(), 30);
        assert!(pred[29] > pred[0]);
    }

    #[test]
    fn gbdt_classifier_separates_two_groups() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { i as f64 } else { 1.0 });
        let labels: Vec<bool> = (0..20).map(|i| i < 10).collect();
        let mut clf = GbdtClassifier::new(params());
        clf.fit(x.view(), &labels).unwrap();
        let proba = clf.predict_proba(x.view()).unwrap();
        assert!(proba[0] > proba[19]);
    }

    #[test]
    fn single_class_gives_constant_probability() {
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let mut clf = GbdtClassifier::new(params());
        clf.fit(x.view(), &[true; 5]).unwrap();
        assert!(clf.predict_proba(x.view()).unwrap().iter().all(|&p| p == 1.0));
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = GbdtRegressor::new(params());
        assert!(model.predict(Array2::zeros((1, 1)).view()).is_err());
    }
}
