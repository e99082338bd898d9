use thiserror::Error;

/// Errors raised by applicability-domain estimators and their helpers.
#[derive(Debug, Error)]
pub enum AdError {
    /// Configuration rejected at construction or parse time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `predict`/`predict_proba` called before `fit`.
    #[error("{0} is not fitted yet, call `fit` first")]
    NotFitted(&'static str),

    /// `fit` called without targets while the threshold policy needs them.
    #[error("{0} requires target values `y` for the configured threshold policy")]
    MissingTarget(&'static str),

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Matrix inversion failed even after ridge regularisation.
    #[error("singular matrix: {0}")]
    Singular(String),

    /// Failure raised by an inner regressor or classifier.
    #[error("model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, AdError>;

/// Check that two lengths agree, naming the call site in the error.
pub(crate) fn check_len(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AdError::ShapeMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}
