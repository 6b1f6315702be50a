//! GPT-2 style decoder-only language model.
//!
//! [`Gpt`] mirrors the PyTorch module tree of the reference network, so its
//! parameter names line up with `state_dict` keys from training checkpoints.
//! Besides a CPU forward pass it can lower itself into an ONNX graph.

mod block;
mod config;
mod export;
mod model;


pub use block::Block;
pub use config::Gpt2Config;
pub use export::{ExportOptions, BATCH_AXIS, INPUT_NAME, OUTPUT_NAME, SEQUENCE_AXIS};
pub use model::{Gpt, LoadReport, ModelMode};
