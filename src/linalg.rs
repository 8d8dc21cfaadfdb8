// Dense helpers for the small matrices handled by the minimiser.
// Everything here works on owned ndarray buffers and never panics on
// shape problems: callers get `None` (or infinity) instead.

use ndarray::{Array1, Array2};

const JACOBI_MAX_SWEEPS: usize = 64;

#[inline]
pub(crate) fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// Root-mean-square of the components, `sqrt(mean(v_i^2))`.
#[inline]
pub(crate) fn rms(v: &Array1<f64>) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    (v.dot(v) / v.len() as f64).sqrt()
}

pub(crate) fn is_symmetric(a: &Array2<f64>, tol: f64) -> bool {
    let n = a.nrows();
    if a.ncols() != n {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let scale = 1.0 + a[[i, j]].abs().max(a[[j, i]].abs());
            if (a[[i, j]] - a[[j, i]]).abs() > tol * scale {
                return false;
            }
        }
    }
    true
}

// Replace a with (a + a^T) / 2 in place.
pub(crate) fn symmetrize(a: &mut Array2<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let v = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = v;
            a[[j, i]] = v;
        }
    }
}

// Simple dense SPD Cholesky (LL^T). Returns None when `a` is not positive definite.
pub(crate) fn chol_decompose(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Inverts a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `None` if the matrix is not square, contains non-finite entries,
/// or a pivot vanishes (exactly singular in floating point).
pub(crate) fn invert(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n || a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mut m = a.clone();
    let mut inv = Array2::<f64>::eye(n);
    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_abs = m[[col, col]].abs();
        for row in (col + 1)..n {
            if m[[row, col]].abs() > pivot_abs {
                pivot_abs = m[[row, col]].abs();
                pivot_row = row;
            }
        }
        if pivot_abs == 0.0 {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([col, k], [pivot_row, k]);
                inv.swap([col, k], [pivot_row, k]);
            }
        }
        let pivot = m[[col, col]];
        for k in 0..n {
            m[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                m[[row, k]] -= factor * m[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

/// Eigenvalues of a symmetric matrix by cyclic Jacobi rotations (unsorted).
pub(crate) fn symmetric_eigenvalues(a: &Array2<f64>) -> Array1<f64> {
    let n = a.nrows();
    let mut m = a.clone();
    let frob = m.iter().map(|v| v * v).sum::<f64>().sqrt();
    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m[[p, q]] * m[[p, q]];
            }
        }
        if off.sqrt() <= f64::EPSILON * frob {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
            }
        }
    }
    m.diag().to_owned()
}

/// 2-norm condition number `sigma_max / sigma_min`.
///
/// Symmetric input uses the eigenvalue magnitudes directly, which keeps the
/// full dynamic range; anything else goes through the eigenvalues of `A^T A`.
/// A singular (or non-finite) matrix reports `f64::INFINITY`.
pub(crate) fn condition_number(a: &Array2<f64>) -> f64 {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        return f64::INFINITY;
    }
    if a.iter().any(|v| !v.is_finite()) {
        return f64::INFINITY;
    }
    let singular_values: Array1<f64> = if is_symmetric(a, 1e-12) {
        symmetric_eigenvalues(a).mapv(f64::abs)
    } else {
        let ata = a.t().dot(a);
        symmetric_eigenvalues(&ata).mapv(|v| v.max(0.0).sqrt())
    };
    let smax = singular_values.iter().cloned().fold(0.0, f64::max);
    let smin = singular_values.iter().cloned().fold(f64::INFINITY, f64::min);
    if smin == 0.0 || !smin.is_finite() {
        return f64::INFINITY;
    }
    smax / smin
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use spectral::prelude::*;

    #[test]
    fn test_rms_matches_definition() {
        let v = array![3.0, -4.0];
        // sqrt((9 + 16) / 2)
        assert_that!(&rms(&v)).is_close_to(12.5f64.sqrt(), 1e-14);
        assert_that!(&rms(&Array1::<f64>::zeros(0))).is_close_to(0.0, 1e-15);
    }

    #[test]
    fn test_invert_recovers_identity() {
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let inv = invert(&a).unwrap();
        let prod = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_that!(&prod[[i, j]]).is_close_to(expected, 1e-12);
            }
        }
    }

    #[test]
    fn test_invert_needs_pivoting() {
        // Zero on the leading diagonal entry.
        let a = array![[0.0, 2.0], [1.0, 0.0]];
        let inv = invert(&a).unwrap();
        assert_that!(&inv[[0, 1]]).is_close_to(1.0, 1e-15);
        assert_that!(&inv[[1, 0]]).is_close_to(0.5, 1e-15);
    }

    #[test]
    fn test_invert_rejects_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(invert(&a).is_none());
        assert!(invert(&Array2::<f64>::zeros((2, 3))).is_none());
    }

    #[test]
    fn test_jacobi_eigenvalues_of_known_matrix() {
        // Eigenvalues 1 and 3.
        let a = array![[2.0, 1.0], [1.0, 2.0]];
        let mut eig = symmetric_eigenvalues(&a).to_vec();
        eig.sort_by(|a, b| a.total_cmp(b));
        assert_that!(&eig[0]).is_close_to(1.0, 1e-12);
        assert_that!(&eig[1]).is_close_to(3.0, 1e-12);
    }

    #[test]
    fn test_condition_number() {
        let diag = array![[1e6, 0.0], [0.0, 1.0]];
        assert_that!(&condition_number(&diag)).is_close_to(1e6, 1e-6);
        assert_that!(&condition_number(&Array2::<f64>::eye(4))).is_close_to(1.0, 1e-12);

        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(condition_number(&singular) > 1e12);

        // Non-symmetric: singular values of [[1, 1], [0, 1]] are golden-ratio based.
        let shear = array![[1.0, 1.0], [0.0, 1.0]];
        let phi = (1.0 + 5f64.sqrt()) / 2.0;
        assert_that!(&condition_number(&shear)).is_close_to(phi * phi, 1e-9);
    }

    #[test]
    fn test_cholesky_detects_indefinite() {
        assert!(chol_decompose(&array![[2.0, 0.0], [0.0, 1.0]]).is_some());
        assert!(chol_decompose(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn test_symmetrize() {
        let mut a = array![[1.0, 2.0], [4.0, 1.0]];
        assert!(!is_symmetric(&a, 1e-12));
        symmetrize(&mut a);
        assert!(is_symmetric(&a, 1e-12));
        assert_that!(&a[[0, 1]]).is_close_to(3.0, 1e-15);
    }
}
