//! Reaction-type control: structural applicability domain by exact match of
//! reaction-center signatures.
//!
//! Computing a signature (extracting the reaction center, growing it by
//! `env` bonds and rendering it canonically) belongs to the chemistry
//! toolkit that owns the reaction objects; this module only needs the
//! resulting strings through `ReactionSignature`.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ndarray::{concatenate, Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::{AdScore, CrossValidation, RegressorConfig};
use crate::error::{check_len, AdError, Result};
use crate::model_selection::{run_folds, FoldData, KFold};
use crate::models::factory::build_regressor;

/// Neighbourhood around the reaction center included in a signature.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Atoms up to this many bonds away from the center.
    Depth(u32),
    /// The whole reaction.
    Whole,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Depth(1)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Depth(d) => write!(f, "{}", d),
            Environment::Whole => f.write_str("all"),
        }
    }
}

impl FromStr for Environment {
    type Err = AdError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Environment::Whole);
        }
        s.parse::<u32>().map(Environment::Depth).map_err(|_| {
            AdError::InvalidConfig(format!(
                "unknown environment '{}', expected a non-negative integer or 'all'",
                s
            ))
        })
    }
}

/// Canonical reaction-center signature of a structural object.
pub trait ReactionSignature {
    fn signature(&self, env: Environment) -> Result<String>;
}

/// A plain string is a signature that is already computed, independent of
/// the environment.
impl ReactionSignature for str {
    fn signature(&self, _env: Environment) -> Result<String> {
        Ok(self.to_string())
    }
}

impl ReactionSignature for String {
    fn signature(&self, env: Environment) -> Result<String> {
        self.as_str().signature(env)
    }
}

impl<T: ReactionSignature + ?Sized> ReactionSignature for &T {
    fn signature(&self, env: Environment) -> Result<String> {
        (**self).signature(env)
    }
}

/// Signatures computed elsewhere, one per environment.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecomputedSignatures {
    by_env: BTreeMap<Environment, String>,
}

impl PrecomputedSignatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, env: Environment, signature: impl Into<String>) -> Self {
        self.by_env.insert(env, signature.into());
        self
    }

    pub fn insert(&mut self, env: Environment, signature: impl Into<String>) {
        self.by_env.insert(env, signature.into());
    }
}

impl ReactionSignature for PrecomputedSignatures {
    fn signature(&self, env: Environment) -> Result<String> {
        self.by_env.get(&env).cloned().ok_or_else(|| {
            AdError::InvalidInput(format!("no precomputed signature for environment {}", env))
        })
    }
}

fn collect_signatures<R: ReactionSignature>(
    reactions: impl IntoIterator<Item = R>,
    env: Environment,
) -> Result<BTreeSet<String>> {
    reactions.into_iter().map(|r| r.signature(env)).collect()
}

fn membership<R: ReactionSignature>(
    known: &BTreeSet<String>,
    reactions: impl IntoIterator<Item = R>,
    env: Environment,
) -> Result<Array1<bool>> {
    reactions
        .into_iter()
        .map(|r| r.signature(env).map(|s| known.contains(&s)))
        .collect::<Result<Vec<bool>>>()
        .map(Array1::from)
}

/// Structural AD: a reaction is in domain iff its signature was seen during
/// training.
#[derive(Debug, Clone)]
pub struct ReactionTypeControl {
    env: Environment,
    signatures: Option<BTreeSet<String>>,
}

impl Default for ReactionTypeControl {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}

impl ReactionTypeControl {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            signatures: None,
        }
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn is_fitted(&self) -> bool {
        self.signatures.is_some()
    }

    /// Distinct training signatures, sorted.
    pub fn signatures(&self) -> Option<&BTreeSet<String>> {
        self.signatures.as_ref()
    }

    pub fn fit<R: ReactionSignature>(&mut self, reactions: &[R]) -> Result<()> {
        let signatures = collect_signatures(reactions, self.env)?;
        log::debug!(
            "ReactionTypeControl (env {}): {} reactions, {} distinct signatures",
            self.env,
            reactions.len(),
            signatures.len()
        );
        self.signatures = Some(signatures);
        Ok(())
    }

    pub fn predict<R: ReactionSignature>(&self, reactions: &[R]) -> Result<Array1<bool>> {
        let known = self
            .signatures
            .as_ref()
            .ok_or(AdError::NotFitted("ReactionTypeControl"))?;
        membership(known, reactions, self.env)
    }

    /// Pick the environment with `select_environment`, then fit on all
    /// reactions with it.
    pub fn fit_select<R: ReactionSignature + Sync>(
        reactions: &[R],
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        candidates: &[Environment],
        regressor: &RegressorConfig,
        score: AdScore,
        cv: &CrossValidation,
    ) -> Result<(Self, EnvironmentSelection)> {
        let selection = select_environment(reactions, x, y, candidates, regressor, score, cv)?;
        let mut rtc = Self::new(selection.environment);
        rtc.fit(reactions)?;
        Ok((rtc, selection))
    }
}

/// Outcome of the environment sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSelection {
    pub environment: Environment,
    pub score: f64,
    /// Metric of every candidate, in the order they were evaluated.
    pub scores: Vec<(Environment, f64)>,
}

/// Cross-validate reaction-type control over candidate environments and
/// keep the one maximising `score`.
///
/// Candidates are de-duplicated and visited in ascending order (depths,
/// then the whole reaction); ties go to the later candidate. Every fold
/// trains one regressor whose held-out predictions are shared by all
/// candidates.
pub fn select_environment<R: ReactionSignature + Sync>(
    reactions: &[R],
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    candidates: &[Environment],
    regressor: &RegressorConfig,
    score: AdScore,
    cv: &CrossValidation,
) -> Result<EnvironmentSelection> {
    check_len("select_environment: reactions", x.nrows(), reactions.len())?;
    check_len("select_environment: y", x.nrows(), y.len())?;
    let mut envs = candidates.to_vec();
    envs.sort();
    envs.dedup();
    if envs.is_empty() {
        return Err(AdError::InvalidConfig(
            "environment selection needs at least one candidate".to_string(),
        ));
    }

    let folds = KFold::from_config(cv).split(x.nrows())?;
    let parts = run_folds(&folds, cv.n_jobs, |i, fold| {
        let data = FoldData::new(x, y, i, fold);
        let mut model = build_regressor(regressor)?;
        model.fit(data.x_train.view(), data.y_train.view())?;
        let y_pred = model.predict(data.x_test.view())?;

        let verdicts = envs
            .iter()
            .map(|&env| {
                let known = collect_signatures(fold.train.iter().map(|&r| &reactions[r]), env)?;
                membership(&known, fold.test.iter().map(|&r| &reactions[r]), env)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((data.y_test, y_pred, verdicts))
    })?;

    let concat_f64 = |arrays: Vec<ArrayView1<f64>>| {
        concatenate(Axis(0), &arrays).map_err(|e| AdError::InvalidInput(e.to_string()))
    };
    let y_true = concat_f64(parts.iter().map(|p| p.0.view()).collect())?;
    let y_pred = concat_f64(parts.iter().map(|p| p.1.view()).collect())?;

    let mut best: Option<(Environment, f64)> = None;
    let mut scores = Vec::with_capacity(envs.len());
    for (c, &env) in envs.iter().enumerate() {
        let pooled: Vec<ArrayView1<bool>> = parts.iter().map(|p| p.2[c].view()).collect();
        let ad = concatenate(Axis(0), &pooled).map_err(|e| AdError::InvalidInput(e.to_string()))?;
        let value = score.evaluate(y_true.view(), y_pred.view(), ad.view())?;
        log::debug!("ReactionTypeControl env {}: {} = {:.4}", env, score, value);
        scores.push((env, value));
        if best.map_or(true, |(_, b)| value >= b) {
            best = Some((env, value));
        }
    }

    let (environment, best_score) = best.ok_or_else(|| {
        AdError::InvalidConfig("environment selection needs at least one candidate".to_string())
    })?;
    log::info!(
        "ReactionTypeControl selected env {} ({} = {:.4})",
        environment,
        score,
        best_score
    );
    Ok(EnvironmentSelection {
        environment,
        score: best_score,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing() {
        assert_eq!("all".parse::<Environment>().unwrap(), Environment::Whole);
        assert_eq!("2".parse::<Environment>().unwrap(), Environment::Depth(2));
        let err = "-1".parse::<Environment>().unwrap_err().to_string();
        assert!(err.contains("'all'"), "{}", err);
        assert!(Environment::Depth(7) < Environment::Whole);
    }

    #[test]
    fn precomputed_signatures_by_environment() {
        let r = PrecomputedSignatures::new()
            .with(Environment::Depth(0), "C>>O")
            .with(Environment::Whole, "CC>>CO");
        assert_eq!(r.signature(Environment::Whole).unwrap(), "CC>>CO");
        assert!(r.signature(Environment::Depth(3)).is_err());
    }

    #[test]
    fn depth_changes_the_verdict() {
        let train = vec![
            PrecomputedSignatures::new()
                .with(Environment::Depth(0), "C>>O")
                .with(Environment::Depth(1), "CC>>CO"),
        ];
        let query = vec![
            PrecomputedSignatures::new()
                .with(Environment::Depth(0), "C>>O")
                .with(Environment::Depth(1), "NC>>NO"),
        ];
        let mut shallow = ReactionTypeControl::new(Environment::Depth(0));
        shallow.fit(&train).unwrap();
        assert!(shallow.predict(&query).unwrap()[0]);
        let mut deep = ReactionTypeControl::new(Environment::Depth(1));
        deep.fit(&train).unwrap();
        assert!(!deep.predict(&query).unwrap()[0]);
    }

    #[test]
    fn predict_before_fit() {
        let rtc = ReactionTypeControl::default();
        assert!(matches!(rtc.predict(&["A>>B"]), Err(AdError::NotFitted(_))));
    }
}
