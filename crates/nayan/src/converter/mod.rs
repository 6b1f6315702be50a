//! Checkpoint to ONNX conversion.
//!
//! ```no_run
//! use nayan::{Converter, ConvertOptions, Gpt2Config};
//!
//! let converter = Converter::new(Gpt2Config::default()).with_options(ConvertOptions {
//!     seed: Some(0),
//!     ..Default::default()
//! });
//! let result = converter.convert_with_progress("ckpt.safetensors", "ckpt.onnx", |stage| {
//!     println!("{}", stage);
//! });
//! assert!(result.success, "{}", result.message);
//! ```

mod checkpoint;
mod model;
mod types;

pub use checkpoint::{
    detect_container, load_checkpoint, remove_orig_mod_prefix, CheckpointContainer, ORIG_MOD_PREFIX,
};
pub use model::{dummy_input, Converter};
pub use types::{
    ConversionOutcome, ConversionResult, ConversionStage, ConvertError, ConvertOptions, ConvertResult,
};

use std::path::{Path, PathBuf};

/// Converts a checkpoint with the fixed nayan hyperparameters.
///
/// Never fails or panics: every problem is reported through the returned
/// record's `message`.
pub fn convert(input: impl AsRef<Path>, output: impl AsRef<Path>) -> ConversionResult {
    Converter::default().convert(input, output)
}

/// `<dir>/<stem>.onnx` next to the checkpoint.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("onnx")
}
