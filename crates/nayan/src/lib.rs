//! Convert GPT-2 training checkpoints into portable ONNX graphs.
//!
//! The converter rebuilds the network from fixed hyperparameters, loads the
//! checkpoint weights into it and writes a standard ONNX model that mobile
//! runtimes can execute.
//!
//! # Example
//!
//! ```no_run
//! let result = nayan::convert("ckpt.safetensors", "model.onnx");
//! if result.success {
//!     println!("{} ({:.1} MB)", result.message, result.model_size_mb.unwrap_or_default());
//! } else {
//!     eprintln!("{}", result.message);
//! }
//! ```

pub mod converter;
pub mod inspector;

pub use converter::{
    convert, default_output_path, remove_orig_mod_prefix, CheckpointContainer, ConversionOutcome,
    ConversionResult, ConversionStage, ConvertError, ConvertOptions, ConvertResult, Converter,
};
pub use inspector::{describe_artifact, inspect, ArtifactSummary, InspectionResult, TensorSummary};
pub use nayan_models::{Gpt, Gpt2Config, LoadReport};

/// Bytes per megabyte in reported sizes.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
