pub mod linear_algebra;
pub mod masks;

pub use linear_algebra::matmul_3d_2d_transposed;
pub use masks::{apply_causal_mask, create_causal_bias, create_causal_mask, MASK_VALUE};
