//! Core transformer components for the nayan converter.
//!
//! This crate provides the building blocks of GPT-2 style decoders together with
//! the plumbing needed to move their weights in and out of files:
//!
//! - CPU reference layers (embeddings, layer norm, causal self-attention, MLP)
//! - [`StateDict`] and the safetensors checkpoint loader
//! - [`onnx::GraphBuilder`], which lowers the layers into a standard ONNX graph

pub mod activations;
pub mod attention;
pub mod embeddings;
pub mod feedforward;
pub mod linear_layer;
pub mod normalization;
pub mod onnx;
pub mod traits;
pub mod utils;
pub mod weights;

// Re-export commonly used items
pub use crate::{
    attention::CausalSelfAttention,
    embeddings::Embedding,
    feedforward::Mlp,
    linear_layer::LinearLayer,
    normalization::LayerNorm,
    onnx::{GraphBuilder, Lower},
    traits::{Param, ParamMut, Parameterized},
    weights::{SafeTensorsLoader, StateDict},
};
