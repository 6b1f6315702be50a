use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use nayan_transformers::onnx::pb::tensor_proto::DataType;
use nayan_transformers::onnx::pb::tensor_shape_proto::dimension;
use nayan_transformers::onnx::pb::{self, type_proto};
use nayan_transformers::onnx::read_model;

use super::types::{ArtifactSummary, TensorSummary};
use crate::BYTES_PER_MB;

fn elem_type_name(code: i32) -> String {
    match DataType::from_i32(code) {
        Some(dt) => dt.as_str_name().to_lowercase(),
        None => format!("unknown({})", code),
    }
}

fn tensor_summary(info: &pb::ValueInfoProto) -> TensorSummary {
    let tensor = info.r#type.as_ref().and_then(|t| match &t.value {
        Some(type_proto::Value::TensorType(tensor)) => Some(tensor),
        _ => None,
    });
    let elem_type = tensor
        .map(|t| elem_type_name(t.elem_type))
        .unwrap_or_else(|| "unknown".to_string());
    let dims = tensor
        .and_then(|t| t.shape.as_ref())
        .map(|shape| {
            shape
                .dim
                .iter()
                .map(|d| match &d.value {
                    Some(dimension::Value::DimValue(v)) => v.to_string(),
                    Some(dimension::Value::DimParam(p)) => p.clone(),
                    None => "?".to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    TensorSummary {
        name: info.name.clone(),
        elem_type,
        dims,
    }
}

fn element_count(tensor: &pb::TensorProto) -> u64 {
    tensor.dims.iter().map(|&d| d.max(0) as u64).product()
}

/// Decodes an ONNX file and summarises its interface and contents.
pub fn describe_artifact(path: impl AsRef<Path>) -> Result<ArtifactSummary> {
    let path = path.as_ref();
    let size_bytes = std::fs::metadata(path)
        .with_context(|| format!("Model file not found: {}", path.display()))?
        .len();
    let model = read_model(path)?;
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| anyhow!("{:?} does not contain a graph", path))?;

    let opset = model
        .opset_import
        .iter()
        .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
        .map(|o| o.version);

    let mut op_counts = BTreeMap::new();
    for node in &graph.node {
        *op_counts.entry(node.op_type.clone()).or_insert(0) += 1;
    }

    Ok(ArtifactSummary {
        path: path.display().to_string(),
        size_bytes,
        size_mb: size_bytes as f64 / BYTES_PER_MB,
        ir_version: model.ir_version,
        opset,
        producer_name: model.producer_name.clone(),
        producer_version: model.producer_version.clone(),
        graph_name: graph.name.clone(),
        inputs: graph.input.iter().map(tensor_summary).collect(),
        outputs: graph.output.iter().map(tensor_summary).collect(),
        node_count: graph.node.len(),
        initializer_count: graph.initializer.len(),
        parameter_count: graph.initializer.iter().map(element_count).sum(),
        op_counts,
        metadata: model
            .metadata_props
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect(),
    })
}
