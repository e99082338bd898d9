use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{AdError, Result};

/// Prepend a column of ones to `x`.
pub fn with_intercept(x: ArrayView2<f64>) -> Array2<f64> {
    let (n, p) = x.dim();
    let mut out = Array2::ones((n, p + 1));
    out.slice_mut(ndarray::s![.., 1..]).assign(&x);
    out
}

/// `(XᵀX + ridge·I)⁻¹` for the given design matrix.
pub fn gram_inverse(x: ArrayView2<f64>, ridge: f64) -> Result<Array2<f64>> {
    let mut gram = x.t().dot(&x);
    for i in 0..gram.nrows() {
        gram[(i, i)] += ridge;
    }
    invert(gram)
}

/// Gauss-Jordan inversion with partial pivoting.
///
/// Only an exactly zero pivot is rejected, so a ridge added to the diagonal
/// keeps collinear designs invertible whatever the magnitude of the entries.
pub fn invert(mut a: Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(AdError::ShapeMismatch {
            context: "invert: square matrix",
            expected: n,
            actual: a.ncols(),
        });
    }
    if !a.iter().all(|v| v.is_finite()) {
        return Err(AdError::Singular("matrix contains non-finite values".to_string()));
    }
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[(i, col)].abs().total_cmp(&a[(j, col)].abs()))
            .unwrap_or(col);
        let pivot = a[(pivot_row, col)];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(AdError::Singular(format!(
                "pivot {:e} in column {} is too small",
                pivot, col
            )));
        }
        if pivot_row != col {
            swap_rows(&mut a, pivot_row, col);
            swap_rows(&mut inv, pivot_row, col);
        }

        let inv_pivot = 1.0 / pivot;
        a.row_mut(col).mapv_inplace(|v| v * inv_pivot);
        inv.row_mut(col).mapv_inplace(|v| v * inv_pivot);

        let a_col = a.row(col).to_owned();
        let inv_col = inv.row(col).to_owned();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[(row, col)];
            if factor != 0.0 {
                a.row_mut(row).scaled_add(-factor, &a_col);
                inv.row_mut(row).scaled_add(-factor, &inv_col);
            }
        }
    }
    Ok(inv)
}

fn swap_rows(m: &mut Array2<f64>, i: usize, j: usize) {
    let (mut first, mut second) = m.multi_slice_mut((ndarray::s![i, ..], ndarray::s![j, ..]));
    ndarray::Zip::from(&mut first)
        .and(&mut second)
        .for_each(|a, b| std::mem::swap(a, b));
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
pub fn cholesky(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(AdError::Singular(format!(
                        "matrix is not positive definite (pivot {} at {})",
                        sum, i
                    )));
                }
                l[(i, i)] = sum.sqrt();
            } else {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }
    Ok(l)
}

/// Solve `L z = b` for lower-triangular `L`.
pub fn solve_lower(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[(i, k)] * z[k];
        }
        z[i] = sum / l[(i, i)];
    }
    z
}

/// Solve `Lᵀ x = z` for lower-triangular `L`.
pub fn solve_upper_transposed(l: ArrayView2<f64>, z: ArrayView1<f64>) -> Array1<f64> {
    let n = z.len();
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[(k, i)] * x[k];
        }
        x[i] = sum / l[(i, i)];
    }
    x
}

/// Solve `(L Lᵀ) x = b` given the Cholesky factor `L`.
pub fn cholesky_solve(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let z = solve_lower(l, b);
    solve_upper_transposed(l, z.view())
}

/// Row-wise quadratic form `xᵢᵀ M xᵢ`.
pub fn row_quadratic_forms(x: ArrayView2<f64>, m: ArrayView2<f64>) -> Array1<f64> {
    let xm = x.dot(&m);
    (&xm * &x).sum_axis(Axis(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn invert_recovers_identity() {
        let a = array![[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]];
        let inv = invert(a.clone()).unwrap();
        let id = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((id[(i, j)] - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn invert_needs_pivoting() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let inv = invert(a).unwrap();
        assert_eq!(inv, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn singular_matrix_is_reported() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(invert(a), Err(AdError::Singular(_))));
    }

    #[test]
    fn ridge_rescues_collinear_columns() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        assert!(gram_inverse(x.view(), 0.0).is_err());
        assert!(gram_inverse(x.view(), 1e-8).is_ok());
    }

    #[test]
    fn ridge_rescues_collinear_columns_at_descriptor_scale() {
        let x = Array2::from_shape_fn((50, 3), |(i, j)| match j {
            0 => 1.0,
            _ => 1000.0 * ((i * 37) % 50) as f64 / 50.0,
        });
        let inv = gram_inverse(x.view(), 1e-8).unwrap();
        assert!(inv.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn cholesky_solve_matches_direct_solution() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let l = cholesky(a.view()).unwrap();
        let x = cholesky_solve(l.view(), b.view());
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-12 && (back[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn intercept_column_is_prepended() {
        let x = array![[2.0], [3.0]];
        assert_eq!(with_intercept(x.view()), array![[1.0, 2.0], [1.0, 3.0]]);
    }
}
