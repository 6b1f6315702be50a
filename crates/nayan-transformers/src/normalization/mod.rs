mod layer_norm;

pub use layer_norm::{LayerNorm, DEFAULT_LAYER_NORM_EPS};
