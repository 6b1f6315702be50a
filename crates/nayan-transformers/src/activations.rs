//! Activation functions and softmax operations.

use libm::erff;
use ndarray::{parallel::prelude::*, Array, Array2, Dimension};

/// Minimum array size for parallel execution.
pub const PARALLEL_THRESHOLD: usize = 16_384;

pub(crate) const SQRT_2_INV: f32 = 0.7071067811865475;

/// Exact GELU, `0.5 * x * (1 + erf(x / sqrt(2)))` (PyTorch `nn.GELU()` default).
#[inline(always)]
pub fn gelu_scalar(x: f32) -> f32 {
    0.5 * x * (1.0 + erff(x * SQRT_2_INV))
}

/// Applies GELU in-place, in parallel for large activations.
pub fn gelu<D: Dimension>(x: &mut Array<f32, D>) {
    if x.len() >= PARALLEL_THRESHOLD {
        x.par_mapv_inplace(gelu_scalar);
    } else {
        x.mapv_inplace(gelu_scalar);
    }
}

/// Applies softmax in-place to a slice.
///
/// `-inf` entries become exactly zero. A row that is entirely `-inf` is left as is.
pub fn softmax_inplace(slice: &mut [f32]) {
    if slice.is_empty() {
        return;
    }

    let max = slice.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if max == f32::NEG_INFINITY {
        return;
    }

    let mut sum = 0.0;
    for v in slice.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    if sum > 0.0 {
        let scale = 1.0 / sum;
        for v in slice.iter_mut() {
            *v *= scale;
        }
    }
}

/// Applies softmax along the last axis of a 2D array.
pub fn softmax_rows_inplace(scores: &mut Array2<f32>) {
    for mut row in scores.rows_mut() {
        if let Some(slice) = row.as_slice_mut() {
            softmax_inplace(slice);
        } else {
            let mut owned = row.to_vec();
            softmax_inplace(&mut owned);
            for (dst, src) in row.iter_mut().zip(owned) {
                *dst = src;
            }
        }
    }
}
