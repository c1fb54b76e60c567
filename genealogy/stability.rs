use super::tmrca::GenealogyMatrix;
use super::tree::{LocalTree, TreeError};
use ndarray::{Array1, ArrayView1, ArrayView2};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{EigValsh, Inverse, UPLO};
use thiserror::Error;

/// Eigenvalues below `-DEFAULT_PSD_TOLERANCE` reject a covariance matrix.
pub const DEFAULT_PSD_TOLERANCE: f64 = 1.0e-8;

#[derive(Error, Debug)]
pub enum StabilityError {
    #[error("expected a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error(
        "covariance matrix is not positive semi-definite: smallest eigenvalue {min_eigenvalue:e} is below -{tolerance:e}"
    )]
    NonPsdMatrix { min_eigenvalue: f64, tolerance: f64 },

    #[error("covariance matrix is singular and cannot be inverted")]
    SingularMatrix,

    #[error("vector of length {found} does not match a {expected}x{expected} matrix")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("eigendecomposition failed: {0}")]
    Eigendecomposition(#[source] LinalgError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Validates that a symmetric matrix is positive semi-definite within
/// `tolerance`. Only the lower triangle is read.
pub fn check_psd(matrix: ArrayView2<'_, f64>, tolerance: f64) -> Result<(), StabilityError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(StabilityError::NotSquare { rows, cols });
    }
    if rows == 0 {
        return Ok(());
    }
    let eigenvalues = matrix
        .to_owned()
        .eigvalsh(UPLO::Lower)
        .map_err(StabilityError::Eigendecomposition)?;
    let min_eigenvalue = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    if min_eigenvalue < -tolerance {
        return Err(StabilityError::NonPsdMatrix {
            min_eigenvalue,
            tolerance,
        });
    }
    Ok(())
}

/// Computes `covariance^-1 * vector` after checking the matrix is PSD.
pub fn solve_covariance(
    covariance: ArrayView2<'_, f64>,
    vector: ArrayView1<'_, f64>,
    tolerance: f64,
) -> Result<Array1<f64>, StabilityError> {
    check_psd(covariance, tolerance)?;
    let n = covariance.nrows();
    if vector.len() != n {
        return Err(StabilityError::DimensionMismatch {
            expected: n,
            found: vector.len(),
        });
    }
    let inverse = covariance
        .to_owned()
        .inv()
        .map_err(|err| {
            log::debug!("covariance inversion failed: {err}");
            StabilityError::SingularMatrix
        })?;
    if inverse.iter().any(|value| !value.is_finite()) {
        return Err(StabilityError::SingularMatrix);
    }
    Ok(inverse.dot(&vector))
}

/// Builds the genealogical covariance of `tree` and applies its inverse to
/// `vector`.
pub fn solve<T: LocalTree>(
    tree: &T,
    vector: ArrayView1<'_, f64>,
    tolerance: f64,
) -> Result<Array1<f64>, StabilityError> {
    let genealogy = GenealogyMatrix::from_tree(tree)?;
    let covariance = genealogy.covariance();
    solve_covariance(covariance.view(), vector, tolerance)
}
