//! Describe an exported ONNX model

use std::path::Path;

use anyhow::Result;
use colored::*;

use nayan::{describe_artifact, inspect, ArtifactSummary, InspectionResult, TensorSummary};

use crate::commands::display::{self, Format};

pub fn run(path: &Path, detailed: bool, format: &str) -> Result<bool> {
    let format = Format::parse(format)?;
    let result = inspect(path);

    if !detailed || !result.success {
        print!("{}", format_result(&result, format)?);
        return Ok(result.success);
    }

    match describe_artifact(path) {
        Ok(summary) => {
            print!("{}", format_summary(&summary, format)?);
            Ok(true)
        }
        Err(e) => {
            let failed = InspectionResult::failure(format!("{:#}", e));
            print!("{}", format_result(&failed, format)?);
            Ok(false)
        }
    }
}

fn format_result(result: &InspectionResult, format: Format) -> Result<String> {
    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(result)?)),
        Format::Text => {
            if !result.success {
                return Ok(format!(
                    "{}\n",
                    display::failure_line(result.message.as_deref().unwrap_or("Inspection failed"))
                ));
            }
            let mut out = String::new();
            out.push_str(&format!("{}\n", result.path.as_deref().unwrap_or_default().bold()));
            if let Some(mb) = result.size_mb {
                out.push_str(&format!("{}\n", display::field("size", display::megabytes(mb))));
            }
            Ok(out)
        }
    }
}

fn tensor_line(t: &TensorSummary) -> String {
    format!("{} {} [{}]", t.name, t.elem_type.dimmed(), t.dims.join(", "))
}

fn format_summary(summary: &ArtifactSummary, format: Format) -> Result<String> {
    if format == Format::Json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(summary)?));
    }

    let mut out = String::new();
    out.push_str(&format!("{}\n", summary.path.bold()));
    out.push_str(&format!("{}\n", display::field("size", display::megabytes(summary.size_mb))));
    out.push_str(&format!(
        "{}\n",
        display::field(
            "producer",
            format!("{} {}", summary.producer_name, summary.producer_version)
        )
    ));
    out.push_str(&format!("{}\n", display::field("ir version", summary.ir_version)));
    if let Some(opset) = summary.opset {
        out.push_str(&format!("{}\n", display::field("opset", opset)));
    }
    for input in &summary.inputs {
        out.push_str(&format!("{}\n", display::field("input", tensor_line(input))));
    }
    for output in &summary.outputs {
        out.push_str(&format!("{}\n", display::field("output", tensor_line(output))));
    }
    out.push_str(&format!("{}\n", display::field("nodes", summary.node_count)));
    out.push_str(&format!(
        "{}\n",
        display::field(
            "initializers",
            format!("{} ({} values)", summary.initializer_count, summary.parameter_count)
        )
    ));

    let ops: Vec<String> = summary
        .op_counts
        .iter()
        .map(|(op, n)| format!("{}×{}", op, n))
        .collect();
    out.push_str(&format!("{}\n", display::field("operators", ops.join(" "))));
    for (key, value) in &summary.metadata {
        out.push_str(&format!("{}\n", display::field(key, value)));
    }
    Ok(out)
}
