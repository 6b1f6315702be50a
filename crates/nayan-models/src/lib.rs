//! Model implementations built on nayan-transformers.
//!
//! Currently a single architecture: the GPT-2 style decoder used by the nayan
//! converter, see [`models::gpt2`].

pub mod models;

pub use models::gpt2::{Block, ExportOptions, Gpt, Gpt2Config, LoadReport, ModelMode};
