//! qsar-ad: applicability-domain estimation for QSAR/QSPR models.
//!
//! This crate provides the applicability-domain (AD) estimators (bounding
//! box, leverage, nearest-neighbour distance, ensemble and Gaussian-process
//! variance, two-class reliability classifier, reaction-type control), the
//! cross-validated threshold search they share, and the consensus logic
//! that combines AD verdicts with prediction-quality metrics.
//!
//! The regressors and classifiers trained inside the cross-validation loops
//! are small implementations of the `models` traits, built from
//! configuration so every fold gets a fresh instance.
pub mod config;
pub mod consensus;
pub mod data_handling;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod model_selection;
pub mod models;
pub mod neighbors;
pub mod preprocessing;
pub mod report;
pub mod scoring;
pub mod stats;
pub mod threshold;

pub use domain::{AdConfig, AdMethod, DomainEstimator, ScoredDomainEstimator};
pub use error::{AdError, Result};
