//! Matrix conversion utilities for the pestlin-rs library.
//!
//! Covariance and Jacobian data are stored as ndarray `Array2`, while dense
//! inversion is delegated to nalgebra. These helpers move data between the two
//! representations and wrap the inversion itself.

use crate::error::{PestError, Result};
use nalgebra::DMatrix;
use ndarray::Array2;

/// Convert an ndarray Array2 to a nalgebra DMatrix.
pub fn ndarray_to_nalgebra(arr: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = arr.dim();
    DMatrix::from_fn(rows, cols, |i, j| arr[[i, j]])
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Invert a square matrix.
///
/// # Errors
///
/// * `PestError::DimensionMismatch` if the matrix is not square
/// * `PestError::LinearAlgebra` if the matrix is singular
pub fn invert(arr: &Array2<f64>, label: &str) -> Result<Array2<f64>> {
    let (rows, cols) = arr.dim();
    if rows != cols {
        return Err(PestError::DimensionMismatch(format!(
            "cannot invert non-square matrix '{}' of shape {}x{}",
            label, rows, cols
        )));
    }
    if rows == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let inverse = ndarray_to_nalgebra(arr).try_inverse().ok_or_else(|| {
        PestError::LinearAlgebra(format!("matrix '{}' is singular", label))
    })?;

    Ok(nalgebra_to_ndarray(&inverse))
}
