//! Small dense least-squares solver, sized for the table fit's
//! `N x 64` systems (spec.md §4.8, §9 "numeric backend").

use nalgebra::{DMatrix, DVector};

use crate::error::{AngleError, Result};

/// Solve `a x ≈ b` in the least-squares sense via thin SVD, accepting the
/// minimum-norm solution when `a` is rank-deficient (e.g. a bucket with
/// no contributing step).
pub fn lstsq(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.nrows() != b.len() {
        return Err(AngleError::LstsqFailed(format!(
            "row mismatch: A has {} rows, b has {}",
            a.nrows(),
            b.len()
        )));
    }
    let svd = a.clone().svd(true, true);
    svd.solve(b, 1e-10)
        .map_err(|e| AngleError::LstsqFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_overdetermined_system() {
        // y = 2x, sampled with noise-free points.
        let a = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let b = DVector::from_row_slice(&[2.0, 4.0, 6.0]);
        let x = lstsq(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn handles_rank_deficient_minimum_norm() {
        // Two identical columns: infinitely many solutions sum to 4;
        // minimum-norm solution splits evenly.
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let b = DVector::from_row_slice(&[4.0]);
        let x = lstsq(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-6);
        assert!((x[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let a = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(lstsq(&a, &b).is_err());
    }
}
