use std::collections::HashMap;

use anyhow::{anyhow, ensure, Result};
use ndarray::ArrayViewD;

use super::pb;
use super::pb::attribute_proto::AttributeType;
use super::pb::tensor_shape_proto::dimension;
use super::{ir_version_for_opset, SUPPORTED_OPSETS};
use crate::utils::create_causal_bias;

pub use super::pb::tensor_proto::DataType;

/// One dimension of a graph input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Fixed(i64),
    Symbolic(String),
}

impl Dim {
    pub fn symbolic(name: &str) -> Self {
        Dim::Symbolic(name.to_string())
    }

    fn to_proto(&self) -> pb::tensor_shape_proto::Dimension {
        let value = match self {
            Dim::Fixed(v) => dimension::Value::DimValue(*v),
            Dim::Symbolic(s) => dimension::Value::DimParam(s.clone()),
        };
        pb::tensor_shape_proto::Dimension {
            value: Some(value),
            ..Default::default()
        }
    }
}

pub fn attr_int(name: &str, value: i64) -> pb::AttributeProto {
    pb::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

pub fn attr_ints(name: &str, values: &[i64]) -> pb::AttributeProto {
    pb::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: values.to_vec(),
        ..Default::default()
    }
}

pub fn attr_float(name: &str, value: f32) -> pb::AttributeProto {
    pb::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Float as i32,
        f: value,
        ..Default::default()
    }
}

fn value_info(name: &str, elem_type: DataType, dims: &[Dim]) -> pb::ValueInfoProto {
    let tensor = pb::type_proto::Tensor {
        elem_type: elem_type as i32,
        shape: Some(pb::TensorShapeProto {
            dim: dims.iter().map(Dim::to_proto).collect(),
        }),
    };
    pb::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(pb::TypeProto {
            value: Some(pb::type_proto::Value::TensorType(tensor)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Incrementally assembles an ONNX graph.
///
/// When `fold_constants` is set, weight layout transforms (transposes, splits) are
/// applied to the initializers at build time instead of being emitted as nodes.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<pb::NodeProto>,
    initializers: Vec<pb::TensorProto>,
    inputs: Vec<pb::ValueInfoProto>,
    outputs: Vec<pb::ValueInfoProto>,
    metadata: Vec<pb::StringStringEntryProto>,
    fold_constants: bool,
    counter: usize,
    scalars: HashMap<u32, String>,
    sequence: Option<(String, usize)>,
    causal_bias: Option<String>,
}

impl GraphBuilder {
    pub fn new(fold_constants: bool) -> Self {
        Self {
            fold_constants,
            ..Default::default()
        }
    }

    pub fn fold_constants(&self) -> bool {
        self.fold_constants
    }

    pub fn nodes(&self) -> &[pb::NodeProto] {
        &self.nodes
    }

    pub fn initializers(&self) -> &[pb::TensorProto] {
        &self.initializers
    }

    /// Returns a value name that has not been handed out before.
    pub fn fresh(&mut self, hint: &str) -> String {
        self.counter += 1;
        format!("{}_{}", hint, self.counter)
    }

    pub fn add_input(&mut self, name: &str, elem_type: DataType, dims: &[Dim]) -> String {
        self.inputs.push(value_info(name, elem_type, dims));
        name.to_string()
    }

    pub fn add_output(&mut self, name: &str, elem_type: DataType, dims: &[Dim]) {
        self.outputs.push(value_info(name, elem_type, dims));
    }

    pub fn add_metadata(&mut self, key: &str, value: impl ToString) {
        self.metadata.push(pb::StringStringEntryProto {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Stores a float tensor as an initializer in row-major order of `view`.
    pub fn add_float_initializer(&mut self, name: &str, view: ArrayViewD<'_, f32>) -> String {
        let raw_data: Vec<u8> = view.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.initializers.push(pb::TensorProto {
            name: name.to_string(),
            dims: view.shape().iter().map(|&d| d as i64).collect(),
            data_type: DataType::Float as i32,
            raw_data,
            ..Default::default()
        });
        name.to_string()
    }

    pub fn add_int64_initializer(&mut self, hint: &str, dims: &[i64], values: &[i64]) -> String {
        let name = self.fresh(hint);
        self.initializers.push(pb::TensorProto {
            name: name.clone(),
            dims: dims.to_vec(),
            data_type: DataType::Int64 as i32,
            int64_data: values.to_vec(),
            ..Default::default()
        });
        name
    }

    /// 1-D int64 constant.
    pub fn int64_vector(&mut self, hint: &str, values: &[i64]) -> String {
        self.add_int64_initializer(hint, &[values.len() as i64], values)
    }

    /// Rank-0 float constant, shared between every use of the same value.
    pub fn scalar(&mut self, value: f32) -> String {
        if let Some(name) = self.scalars.get(&value.to_bits()) {
            return name.clone();
        }
        let name = self.fresh("const");
        self.initializers.push(pb::TensorProto {
            name: name.clone(),
            dims: vec![],
            data_type: DataType::Float as i32,
            float_data: vec![value],
            ..Default::default()
        });
        self.scalars.insert(value.to_bits(), name.clone());
        name
    }

    /// Appends a single-output node and returns the output's name.
    pub fn node(
        &mut self,
        scope: &str,
        op_type: &str,
        inputs: &[&str],
        attribute: Vec<pb::AttributeProto>,
    ) -> String {
        let output = self.fresh(&format!("{}/{}", scope, op_type));
        self.push_node(op_type, inputs, vec![output.clone()], attribute);
        output
    }

    /// Appends a node with `outputs` results.
    pub fn node_multi(
        &mut self,
        scope: &str,
        op_type: &str,
        inputs: &[&str],
        attribute: Vec<pb::AttributeProto>,
        outputs: usize,
    ) -> Vec<String> {
        let base = self.fresh(&format!("{}/{}", scope, op_type));
        let names: Vec<String> = (0..outputs).map(|i| format!("{}:{}", base, i)).collect();
        self.push_node(op_type, inputs, names.clone(), attribute);
        names
    }

    /// Appends a node whose output name is chosen by the caller.
    pub fn node_named(
        &mut self,
        op_type: &str,
        inputs: &[&str],
        output: &str,
        attribute: Vec<pb::AttributeProto>,
    ) {
        self.push_node(op_type, inputs, vec![output.to_string()], attribute);
    }

    fn push_node(
        &mut self,
        op_type: &str,
        inputs: &[&str],
        output: Vec<String>,
        attribute: Vec<pb::AttributeProto>,
    ) {
        let name = output.first().cloned().unwrap_or_default();
        self.nodes.push(pb::NodeProto {
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output,
            name,
            op_type: op_type.to_string(),
            attribute,
            ..Default::default()
        });
    }

    /// Records the runtime sequence length of `input` (dimension 1) for the
    /// position and mask slices, bounded by `max_positions`.
    pub fn track_sequence(&mut self, input: &str, max_positions: usize) -> String {
        let shape = self.node("seq", "Shape", &[input], vec![]);
        let starts = self.int64_vector("seq/starts", &[1]);
        let ends = self.int64_vector("seq/ends", &[2]);
        let len = self.node("seq", "Slice", &[&shape, &starts, &ends], vec![]);
        self.sequence = Some((len.clone(), max_positions));
        self.causal_bias = None;
        len
    }

    /// 1-D tensor holding the tracked sequence length.
    pub fn sequence_length(&self) -> Result<String> {
        self.sequence
            .as_ref()
            .map(|(name, _)| name.clone())
            .ok_or_else(|| anyhow!("sequence length has not been tracked for this graph"))
    }

    /// Additive `[T, T]` mask: 0 on and below the diagonal, -inf above it.
    ///
    /// Built once from a `[max_positions, max_positions]` initializer and shared by
    /// every attention layer.
    pub fn causal_bias(&mut self) -> Result<String> {
        if let Some(name) = &self.causal_bias {
            return Ok(name.clone());
        }
        let (len, max_positions) = self
            .sequence
            .clone()
            .ok_or_else(|| anyhow!("causal mask requested before the sequence length was tracked"))?;

        let full = create_causal_bias(max_positions);
        let table = self.add_float_initializer("attn.causal_bias", full.view().into_dyn());
        let ends = self.node("mask", "Concat", &[&len, &len], vec![attr_int("axis", 0)]);
        let starts = self.int64_vector("mask/starts", &[0, 0]);
        let axes = self.int64_vector("mask/axes", &[0, 1]);
        let bias = self.node("mask", "Slice", &[&table, &starts, &ends, &axes], vec![]);
        self.causal_bias = Some(bias.clone());
        Ok(bias)
    }

    /// Finishes the graph and wraps it in a model for the default ONNX domain.
    pub fn into_model(
        self,
        graph_name: &str,
        opset: i64,
        producer_version: &str,
    ) -> Result<pb::ModelProto> {
        ensure!(
            SUPPORTED_OPSETS.contains(&opset),
            "opset {} is not supported, expected {}..={}",
            opset,
            SUPPORTED_OPSETS.start(),
            SUPPORTED_OPSETS.end()
        );
        ensure!(!self.inputs.is_empty(), "graph {} has no inputs", graph_name);
        ensure!(!self.outputs.is_empty(), "graph {} has no outputs", graph_name);

        log::debug!(
            "graph {}: {} nodes, {} initializers",
            graph_name,
            self.nodes.len(),
            self.initializers.len()
        );

        let graph = pb::GraphProto {
            node: self.nodes,
            name: graph_name.to_string(),
            initializer: self.initializers,
            input: self.inputs,
            output: self.outputs,
            ..Default::default()
        };
        Ok(pb::ModelProto {
            ir_version: ir_version_for_opset(opset),
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: opset,
            }],
            producer_name: "nayan".to_string(),
            producer_version: producer_version.to_string(),
            graph: Some(graph),
            metadata_props: self.metadata,
            ..Default::default()
        })
    }
}
