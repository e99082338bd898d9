use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::AdError;

/// Metric maximised by the threshold optimizer.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdScore {
    /// Balanced accuracy of the AD partition against the 3·RMSE inlier label.
    #[default]
    #[serde(rename = "ba_ad")]
    BalancedAccuracy,
    /// RMSE outside the AD minus RMSE inside the AD.
    #[serde(rename = "rmse_ad")]
    RmseDifference,
}

impl AdScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdScore::BalancedAccuracy => "ba_ad",
            AdScore::RmseDifference => "rmse_ad",
        }
    }
}

impl fmt::Display for AdScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdScore {
    type Err = AdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ba_ad" => Ok(AdScore::BalancedAccuracy),
            "rmse_ad" => Ok(AdScore::RmseDifference),
            _ => Err(AdError::InvalidConfig(format!(
                "unknown score '{}', expected one of: ba_ad, rmse_ad",
                s
            ))),
        }
    }
}

/// How an estimator picks its cutoff on the outlyingness score.
///
/// Serialized as `"auto"`, `"cv"` or a bare number. `{"fixed": v}` is also
/// accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    /// Estimator-specific rule of thumb (leverage, similarity distance).
    Auto,
    /// Nested cross-validated search over the unique out-of-fold scores.
    CrossValidated,
    /// Literal cutoff.
    Fixed(f64),
}

impl Serialize for ThresholdPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ThresholdPolicy::Auto => serializer.serialize_str("auto"),
            ThresholdPolicy::CrossValidated => serializer.serialize_str("cv"),
            ThresholdPolicy::Fixed(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for ThresholdPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "snake_case")]
        enum Tagged {
            Fixed(f64),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Value(f64),
            Name(String),
            Tagged(Tagged),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Value(v) | Repr::Tagged(Tagged::Fixed(v)) => Ok(ThresholdPolicy::Fixed(v)),
            Repr::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

impl ThresholdPolicy {
    pub fn needs_target(&self) -> bool {
        matches!(self, ThresholdPolicy::CrossValidated)
    }

    /// Reject policies an estimator cannot honour. Literal values must be
    /// finite; `Auto` only where the estimator has a rule of thumb.
    pub(crate) fn validate(&self, estimator: &str, allow_auto: bool) -> Result<(), AdError> {
        match self {
            ThresholdPolicy::Fixed(v) if !v.is_finite() => Err(AdError::InvalidConfig(format!(
                "{} threshold must be a finite number, got {}",
                estimator, v
            ))),
            ThresholdPolicy::Auto if !allow_auto => Err(AdError::InvalidConfig(format!(
                "{} threshold must be 'cv' or a float",
                estimator
            ))),
            _ => Ok(()),
        }
    }
}

impl FromStr for ThresholdPolicy {
    type Err = AdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ThresholdPolicy::Auto),
            "cv" => Ok(ThresholdPolicy::CrossValidated),
            other => other.parse::<f64>().map(ThresholdPolicy::Fixed).map_err(|_| {
                AdError::InvalidConfig(format!(
                    "unknown threshold '{}', expected 'auto', 'cv' or a float",
                    s
                ))
            }),
        }
    }
}

/// Explicit cross-validation settings. There is no shared splitter: every
/// routine that cross-validates takes one of these.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct CrossValidation {
    pub n_splits: usize,
    pub seed: u64,
    /// `None` uses the global rayon pool, `Some(1)` runs folds sequentially.
    pub n_jobs: Option<usize>,
}

impl Default for CrossValidation {
    fn default() -> Self {
        Self {
            n_splits: 5,
            seed: 42,
            n_jobs: None,
        }
    }
}

impl CrossValidation {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self {
            n_splits,
            seed,
            n_jobs: None,
        }
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }
}

/// Hyper-parameters of the bagged regression-tree forest.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of descriptors tried at each split, in (0, 1].
    pub max_features: f64,
    pub bootstrap: bool,
    pub seed: u64,
    pub n_jobs: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
            bootstrap: true,
            seed: 42,
            n_jobs: None,
        }
    }
}

impl ForestParams {
    pub(crate) fn validate(&self) -> Result<(), AdError> {
        if self.n_estimators == 0 {
            return Err(AdError::InvalidConfig(
                "forest needs at least one estimator".to_string(),
            ));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(AdError::InvalidConfig(format!(
                "max_features must be in (0, 1], got {}",
                self.max_features
            )));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(AdError::InvalidConfig(
                "min_samples_leaf must be >= 1 and min_samples_split >= 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Gaussian-process kernel settings (RBF + white noise).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GaussianProcessParams {
    pub length_scale: f64,
    pub signal_variance: f64,
    pub noise: f64,
    /// When non-empty, the length scale with the highest log marginal
    /// likelihood among these candidates replaces `length_scale` at fit.
    pub length_scale_grid: Vec<f64>,
}

impl Default for GaussianProcessParams {
    fn default() -> Self {
        Self {
            length_scale: 1.0,
            signal_variance: 1.0,
            noise: 1e-2,
            length_scale_grid: vec![0.1, 0.3, 1.0, 3.0, 10.0],
        }
    }
}

impl GaussianProcessParams {
    pub(crate) fn validate(&self) -> Result<(), AdError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(AdError::InvalidConfig(format!(
                    "GP {} must be finite and > 0, got {}",
                    name, v
                )))
            }
        };
        positive("length_scale", self.length_scale)?;
        positive("signal_variance", self.signal_variance)?;
        positive("noise", self.noise)?;
        for &l in &self.length_scale_grid {
            positive("length_scale_grid entry", l)?;
        }
        Ok(())
    }
}

/// Regressors available to the cross-validation loops of AD estimators.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum RegressorConfig {
    RandomForest(ForestParams),
    GBDT {
        learning_rate: f32,
        max_depth: u32,
        num_boost_round: u32,
        min_leaf_size: usize,
        training_optimization_level: u8,
    },
    Ridge {
        alpha: f64,
    },
    GaussianProcess(GaussianProcessParams),
}

impl Default for RegressorConfig {
    fn default() -> Self {
        RegressorConfig::RandomForest(ForestParams::default())
    }
}

impl FromStr for RegressorConfig {
    type Err = AdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rf" | "random_forest" => Ok(RegressorConfig::RandomForest(ForestParams::default())),
            "gbdt" => Ok(RegressorConfig::GBDT {
                learning_rate: 0.1,
                max_depth: 6,
                num_boost_round: 100,
                min_leaf_size: 1,
                training_optimization_level: 2,
            }),
            "ridge" => Ok(RegressorConfig::Ridge { alpha: 1.0 }),
            "gp" | "gaussian_process" => Ok(RegressorConfig::GaussianProcess(
                GaussianProcessParams::default(),
            )),
            _ => Err(AdError::InvalidConfig(format!(
                "unknown regressor '{}', expected one of: rf, gbdt, ridge, gp",
                s
            ))),
        }
    }
}

/// Probabilistic classifiers for the two-class AD estimator.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ClassifierConfig {
    RandomForest(ForestParams),
    GBDT {
        learning_rate: f32,
        max_depth: u32,
        num_boost_round: u32,
        training_optimization_level: u8,
    },
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::RandomForest(ForestParams::default())
    }
}

impl FromStr for ClassifierConfig {
    type Err = AdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rf" | "random_forest" => Ok(ClassifierConfig::RandomForest(ForestParams::default())),
            "gbdt" => Ok(ClassifierConfig::GBDT {
                learning_rate: 0.1,
                max_depth: 6,
                num_boost_round: 50,
                training_optimization_level: 2,
            }),
            _ => Err(AdError::InvalidConfig(format!(
                "unknown classifier '{}', expected one of: rf, gbdt",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_policy_parses_keywords_and_floats() {
        assert_eq!("cv".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::CrossValidated);
        assert_eq!("AUTO".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::Auto);
        assert_eq!("0.25".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::Fixed(0.25));
    }

    #[test]
    fn threshold_policy_rejects_garbage_with_allowed_values() {
        let err = "sometimes".parse::<ThresholdPolicy>().unwrap_err().to_string();
        assert!(err.contains("'cv'"), "{}", err);
        assert!(err.contains("float"), "{}", err);
    }

    #[test]
    fn score_names_round_trip() {
        for score in [AdScore::BalancedAccuracy, AdScore::RmseDifference] {
            assert_eq!(score.as_str().parse::<AdScore>().unwrap(), score);
        }
        let err = "r2".parse::<AdScore>().unwrap_err().to_string();
        assert!(err.contains("ba_ad") && err.contains("rmse_ad"));
    }

    #[test]
    fn auto_rejected_where_not_supported() {
        assert!(ThresholdPolicy::Auto.validate("GPR", false).is_err());
        assert!(ThresholdPolicy::Auto.validate("Leverage", true).is_ok());
        assert!(ThresholdPolicy::Fixed(f64::NAN).validate("Leverage", true).is_err());
    }

    #[test]
    fn forest_params_validation() {
        let mut params = ForestParams::default();
        assert!(params.validate().is_ok());
        params.max_features = 0.0;
        assert!(params.validate().is_err());
    }
}
