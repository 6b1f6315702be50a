//! Causal attention masks.

use ndarray::{s, Array2};

/// Value written into masked attention scores before softmax.
pub const MASK_VALUE: f32 = f32::NEG_INFINITY;

/// Masks future positions in a `[seq_q, seq_k]` score matrix in-place.
///
/// Query `i` may only attend to keys `j <= i`.
pub fn apply_causal_mask(scores: &mut Array2<f32>) {
    let (seq_q, seq_k) = scores.dim();
    for i in 0..seq_q {
        if i + 1 < seq_k {
            scores.slice_mut(s![i, i + 1..]).fill(MASK_VALUE);
        }
    }
}

/// Lower-triangular visibility mask: 1.0 where query `i` sees key `j`.
pub fn create_causal_mask(seq_len: usize) -> Array2<f32> {
    Array2::from_shape_fn((seq_len, seq_len), |(i, j)| if j <= i { 1.0 } else { 0.0 })
}

/// Additive form of [`create_causal_mask`]: 0.0 where visible, [`MASK_VALUE`] elsewhere.
pub fn create_causal_bias(seq_len: usize) -> Array2<f32> {
    create_causal_mask(seq_len).mapv(|v| if v > 0.0 { 0.0 } else { MASK_VALUE })
}
