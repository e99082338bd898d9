//! Dense linear algebra on `ndarray` matrices.
//!
//! Only what the estimators need: ridge-regularised Gram inverses for the
//! hat matrix, Gauss-Jordan inversion, and Cholesky solves for the
//! Gaussian process. Kept in-crate to avoid a BLAS/LAPACK dependency.
pub mod linalg;

pub use linalg::{cholesky, cholesky_solve, gram_inverse, invert, row_quadratic_forms, with_intercept};
