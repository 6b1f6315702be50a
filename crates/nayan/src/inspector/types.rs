use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InspectionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            size_mb: None,
            path: None,
            message: Some(message.into()),
        }
    }
}

/// A graph input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorSummary {
    pub name: String,
    pub elem_type: String,
    /// Fixed sizes as numbers, symbolic axes by name, `?` when unknown.
    pub dims: Vec<String>,
}

/// Decoded contents of an ONNX file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSummary {
    pub path: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub ir_version: i64,
    pub opset: Option<i64>,
    pub producer_name: String,
    pub producer_version: String,
    pub graph_name: String,
    pub inputs: Vec<TensorSummary>,
    pub outputs: Vec<TensorSummary>,
    pub node_count: usize,
    pub initializer_count: usize,
    pub parameter_count: u64,
    /// Node counts per operator type.
    pub op_counts: BTreeMap<String, usize>,
    pub metadata: BTreeMap<String, String>,
}
