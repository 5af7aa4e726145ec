//! Dense solvers for the small normal-equation systems built during fitting.
//!
//! Gaussian elimination with partial pivoting for `Ax = b`, and Gauss-Jordan
//! inversion for covariance matrices. Sizes are compile-time constants
//! (N <= 5 in practice).

/// Pivots below this magnitude are treated as singular.
const PIVOT_EPSILON: f64 = 1e-300;

/// Solve `a * x = b`. Returns `None` when the matrix is singular.
#[allow(clippy::needless_range_loop)]
pub fn solve<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Option<[f64; N]> {
    let mut matrix = *a;
    let mut rhs = *b;

    for col in 0..N {
        let pivot_row = find_pivot(&matrix, col)?;
        if pivot_row != col {
            matrix.swap(col, pivot_row);
            rhs.swap(col, pivot_row);
        }

        for row in (col + 1)..N {
            let factor = matrix[row][col] / matrix[col][col];
            let pivot = matrix[col];
            for (j, m) in matrix[row].iter_mut().enumerate().skip(col) {
                *m -= factor * pivot[j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let mut sum = rhs[i];
        for (j, &xj) in x.iter().enumerate().skip(i + 1) {
            sum -= matrix[i][j] * xj;
        }
        x[i] = sum / matrix[i][i];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Invert `a`. Returns `None` when the matrix is singular or the result is
/// not finite.
#[allow(clippy::needless_range_loop)]
pub fn invert<const N: usize>(a: &[[f64; N]; N]) -> Option<[[f64; N]; N]> {
    let mut matrix = *a;
    let mut inverse = [[0.0f64; N]; N];
    for (i, row) in inverse.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for col in 0..N {
        let pivot_row = find_pivot(&matrix, col)?;
        if pivot_row != col {
            matrix.swap(col, pivot_row);
            inverse.swap(col, pivot_row);
        }

        let pivot = matrix[col][col];
        for j in 0..N {
            matrix[col][j] /= pivot;
            inverse[col][j] /= pivot;
        }

        for row in 0..N {
            if row == col {
                continue;
            }
            let factor = matrix[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..N {
                matrix[row][j] -= factor * matrix[col][j];
                inverse[row][j] -= factor * inverse[col][j];
            }
        }
    }

    inverse
        .iter()
        .all(|row| row.iter().all(|v| v.is_finite()))
        .then_some(inverse)
}

#[allow(clippy::needless_range_loop)]
fn find_pivot<const N: usize>(matrix: &[[f64; N]; N], col: usize) -> Option<usize> {
    let mut max_row = col;
    let mut max_val = matrix[col][col].abs();
    for row in (col + 1)..N {
        if matrix[row][col].abs() > max_val {
            max_val = matrix[row][col].abs();
            max_row = row;
        }
    }
    if max_val.is_nan() || max_val <= PIVOT_EPSILON {
        return None;
    }
    Some(max_row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_diagonal() {
        let a = [[2.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 5.0]];
        let b = [2.0, 8.0, 15.0];
        let x = solve(&a, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        assert!((x[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        let a = [[0.0, 1.0], [1.0, 0.0]];
        let b = [2.0, 1.0];
        let x = solve(&a, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_singular_returns_none() {
        let a = [[1.0, 2.0], [2.0, 4.0]];
        assert!(solve(&a, &[1.0, 2.0]).is_none());
        assert!(solve(&[[0.0; 5]; 5], &[1.0; 5]).is_none());
    }

    #[test]
    fn test_invert_round_trips_to_identity() {
        let a = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inv = invert(&a).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let product: f64 = (0..3).map(|k| a[i][k] * inv[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product - expected).abs() < 1e-12, "({i},{j}) = {product}");
            }
        }
    }

    #[test]
    fn test_invert_singular_returns_none() {
        let a = [[1.0, 1.0], [1.0, 1.0]];
        assert!(invert(&a).is_none());
    }

    #[test]
    fn test_invert_single_element() {
        let inv = invert(&[[0.25]]).unwrap();
        assert!((inv[0][0] - 4.0).abs() < 1e-15);
    }
}
