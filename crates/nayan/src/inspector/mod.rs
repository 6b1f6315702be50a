//! Reporting on exported ONNX artifacts.

mod summary;
mod types;

pub use summary::describe_artifact;
pub use types::{ArtifactSummary, InspectionResult, TensorSummary};

use std::path::Path;

use crate::BYTES_PER_MB;

/// File-level facts about an exported model.
///
/// Never fails: a missing file or unreadable metadata becomes an unsuccessful
/// record.
pub fn inspect(path: impl AsRef<Path>) -> InspectionResult {
    let path = path.as_ref();
    if !path.exists() {
        return InspectionResult::failure("Model file not found");
    }
    match std::fs::metadata(path) {
        Ok(meta) => InspectionResult {
            success: true,
            size_mb: Some(meta.len() as f64 / BYTES_PER_MB),
            path: Some(path.display().to_string()),
            message: None,
        },
        Err(e) => InspectionResult::failure(e.to_string()),
    }
}
