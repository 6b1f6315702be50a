//! Matrix helpers over ndarray.

use anyhow::{ensure, Result};
use ndarray::{Array3, ArrayView2};

/// Performs matmul for a 3D input and a 2D weight matrix in `[out, in]` layout.
///
/// Computes `a @ b_transposed.T` for every row of every batch.
pub fn matmul_3d_2d_transposed(a: &Array3<f32>, b_transposed: &ArrayView2<f32>) -> Result<Array3<f32>> {
    let (batch, m, k) = a.dim();
    let (n, k2) = b_transposed.dim();
    ensure!(
        k == k2,
        "matmul inner dimensions do not match: input has {} features, weight expects {}",
        k,
        k2
    );

    let a_contig = a.as_standard_layout();
    let a_flat = a_contig.view().into_shape_with_order((batch * m, k))?;
    let c_flat = a_flat.dot(&b_transposed.t());

    Ok(c_flat.into_shape_with_order((batch, m, n))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_matmul_3d_2d_transposed() {
        // [1, 2, 3] input, [2, 3] weight in [out, in] layout
        let a = Array3::from_shape_vec((1, 2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let w = arr2(&[[1.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let c = matmul_3d_2d_transposed(&a, &w.view()).unwrap();
        assert_eq!(c.dim(), (1, 2, 2));
        assert_eq!(c[[0, 0, 0]], 1.0);
        assert_eq!(c[[0, 0, 1]], 6.0);
        assert_eq!(c[[0, 1, 0]], 4.0);
        assert_eq!(c[[0, 1, 1]], 15.0);
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let a = Array3::<f32>::zeros((1, 2, 3));
        let w = ndarray::Array2::<f32>::zeros((2, 4));
        assert!(matmul_3d_2d_transposed(&a, &w.view()).is_err());
    }
}
