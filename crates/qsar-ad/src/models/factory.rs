use crate::config::{ClassifierConfig, RegressorConfig};
use crate::error::Result;
use crate::models::forest::{RandomForestClassifier, RandomForestRegressor};
use crate::models::gaussian_process::GaussianProcessRegressor;
use crate::models::gbdt::{GbdtClassifier, GbdtParams, GbdtRegressor};
use crate::models::linear::RidgeRegression;
use crate::models::regressor_trait::{Classifier, Regressor};

/// Build a fresh, unfitted regressor from a `RegressorConfig`.
/// Every cross-validation fold calls this so no fitted state is shared.
pub fn build_regressor(config: &RegressorConfig) -> Result<Box<dyn Regressor>> {
    Ok(match config {
        RegressorConfig::RandomForest(params) => Box::new(RandomForestRegressor::new(*params)?),
        RegressorConfig::GBDT {
            learning_rate,
            max_depth,
            num_boost_round,
            min_leaf_size,
            training_optimization_level,
        } => Box::new(GbdtRegressor::new(GbdtParams {
            learning_rate: *learning_rate,
            max_depth: *max_depth,
            num_boost_round: *num_boost_round,
            min_leaf_size: *min_leaf_size,
            training_optimization_level: *training_optimization_level,
        })),
        RegressorConfig::Ridge { alpha } => Box::new(RidgeRegression::new(*alpha)?),
        RegressorConfig::GaussianProcess(params) => {
            Box::new(GaussianProcessRegressor::new(params.clone())?)
        }
    })
}

/// Build a fresh, unfitted probabilistic classifier from a `ClassifierConfig`.
pub fn build_classifier(config: &ClassifierConfig) -> Result<Box<dyn Classifier>> {
    Ok(match config {
        ClassifierConfig::RandomForest(params) => Box::new(RandomForestClassifier::new(*params)?),
        ClassifierConfig::GBDT {
            learning_rate,
            max_depth,
            num_boost_round,
            training_optimization_level,
        } => Box::new(GbdtClassifier::new(GbdtParams {
            learning_rate: *learning_rate,
            max_depth: *max_depth,
            num_boost_round: *num_boost_round,
            min_leaf_size: 1,
            training_optimization_level: *training_optimization_level,
        })),
    })
}
