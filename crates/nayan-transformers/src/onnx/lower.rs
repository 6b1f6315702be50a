use std::f32::consts::SQRT_2;

use anyhow::{ensure, Result};
use ndarray::{ArrayView1, ArrayView2};

use super::builder::{attr_int, attr_ints, GraphBuilder};
use crate::traits::join_name;
use crate::{CausalSelfAttention, Embedding, LayerNorm, LinearLayer, Mlp};

/// A layer that can emit its own forward computation into a graph.
pub trait Lower {
    /// Appends the nodes computing this layer on `input` and returns the name of
    /// the result. `prefix` is the layer's parameter path, used to name
    /// initializers after their `state_dict` keys.
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String>;
}

/// `input @ weight^T + bias` for a `[out, in]` weight.
///
/// With constant folding the weight is stored pre-transposed; otherwise a
/// `Transpose` node does it at runtime.
pub fn lower_projection(
    g: &mut GraphBuilder,
    prefix: &str,
    weight: ArrayView2<'_, f32>,
    bias: Option<ArrayView1<'_, f32>>,
    input: &str,
) -> Result<String> {
    let weight_name = join_name(prefix, "weight");
    let rhs = if g.fold_constants() {
        g.add_float_initializer(&weight_name, weight.t().into_dyn())
    } else {
        let w = g.add_float_initializer(&weight_name, weight.into_dyn());
        g.node(prefix, "Transpose", &[&w], vec![attr_ints("perm", &[1, 0])])
    };
    let y = g.node(prefix, "MatMul", &[input, &rhs], vec![]);
    Ok(match bias {
        Some(b) => {
            let b = g.add_float_initializer(&join_name(prefix, "bias"), b.into_dyn());
            g.node(prefix, "Add", &[&y, &b], vec![])
        }
        None => y,
    })
}

impl Lower for LinearLayer {
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String> {
        lower_projection(g, prefix, self.weight.view(), self.bias.as_ref().map(|b| b.view()), input)
    }
}

impl Lower for LayerNorm {
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String> {
        let mean_attrs = || vec![attr_ints("axes", &[-1]), attr_int("keepdims", 1)];

        let mean = g.node(prefix, "ReduceMean", &[input], mean_attrs());
        let centered = g.node(prefix, "Sub", &[input, &mean], vec![]);
        let squared = g.node(prefix, "Mul", &[&centered, &centered], vec![]);
        let var = g.node(prefix, "ReduceMean", &[&squared], mean_attrs());
        let eps = g.scalar(self.eps);
        let var_eps = g.node(prefix, "Add", &[&var, &eps], vec![]);
        let std = g.node(prefix, "Sqrt", &[&var_eps], vec![]);
        let normed = g.node(prefix, "Div", &[&centered, &std], vec![]);

        let w = g.add_float_initializer(&join_name(prefix, "weight"), self.weight.view().into_dyn());
        let b = g.add_float_initializer(&join_name(prefix, "bias"), self.bias.view().into_dyn());
        let scaled = g.node(prefix, "Mul", &[&normed, &w], vec![]);
        Ok(g.node(prefix, "Add", &[&scaled, &b], vec![]))
    }
}

/// Exact GELU: `0.5 * x * (1 + erf(x / sqrt(2)))`.
pub(crate) fn lower_gelu(g: &mut GraphBuilder, scope: &str, x: &str) -> String {
    let sqrt2 = g.scalar(SQRT_2);
    let one = g.scalar(1.0);
    let half = g.scalar(0.5);
    let scaled = g.node(scope, "Div", &[x, &sqrt2], vec![]);
    let erf = g.node(scope, "Erf", &[&scaled], vec![]);
    let shifted = g.node(scope, "Add", &[&erf, &one], vec![]);
    let gated = g.node(scope, "Mul", &[x, &shifted], vec![]);
    g.node(scope, "Mul", &[&gated, &half], vec![])
}

impl Lower for Mlp {
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String> {
        let h = self.c_fc.lower(g, &join_name(prefix, "c_fc"), input)?;
        let h = lower_gelu(g, &join_name(prefix, "gelu"), &h);
        self.c_proj.lower(g, &join_name(prefix, "c_proj"), &h)
    }
}

impl Lower for CausalSelfAttention {
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String> {
        let c_attn = join_name(prefix, "c_attn");

        // Query, key and value: [batch, seq, n_embd] each
        let (q, k, v) = if g.fold_constants() {
            let parts = self.qkv_parts();
            let mut out = Vec::with_capacity(3);
            for (i, tag) in ["q", "k", "v"].iter().enumerate() {
                let bias = parts.biases.as_ref().map(|b| b[i].view());
                out.push(lower_projection(
                    g,
                    &format!("{}.{}", c_attn, tag),
                    parts.weights[i].view(),
                    bias,
                    input,
                )?);
            }
            (out[0].clone(), out[1].clone(), out[2].clone())
        } else {
            let qkv = self.c_attn.lower(g, &c_attn, input)?;
            let parts = g.node_multi(prefix, "Split", &[&qkv], vec![attr_int("axis", 2)], 3);
            (parts[0].clone(), parts[1].clone(), parts[2].clone())
        };

        // [batch, seq, n_head, head_dim]
        let heads = g.int64_vector(
            &format!("{}/heads", prefix),
            &[0, 0, self.n_head as i64, self.head_dim as i64],
        );
        let q = g.node(prefix, "Reshape", &[&q, &heads], vec![]);
        let k = g.node(prefix, "Reshape", &[&k, &heads], vec![]);
        let v = g.node(prefix, "Reshape", &[&v, &heads], vec![]);

        let q = g.node(prefix, "Transpose", &[&q], vec![attr_ints("perm", &[0, 2, 1, 3])]);
        let k = g.node(prefix, "Transpose", &[&k], vec![attr_ints("perm", &[0, 2, 3, 1])]);
        let v = g.node(prefix, "Transpose", &[&v], vec![attr_ints("perm", &[0, 2, 1, 3])]);

        // [batch, n_head, seq, seq]
        let scores = g.node(prefix, "MatMul", &[&q, &k], vec![]);
        let scale = g.scalar(self.scale_factor);
        let scores = g.node(prefix, "Mul", &[&scores, &scale], vec![]);
        let bias = g.causal_bias()?;
        let scores = g.node(prefix, "Add", &[&scores, &bias], vec![]);
        let probs = g.node(prefix, "Softmax", &[&scores], vec![attr_int("axis", 3)]);

        // Back to [batch, seq, n_embd]
        let context = g.node(prefix, "MatMul", &[&probs, &v], vec![]);
        let context = g.node(prefix, "Transpose", &[&context], vec![attr_ints("perm", &[0, 2, 1, 3])]);
        let merged = g.int64_vector(&format!("{}/merge", prefix), &[0, 0, self.n_embd as i64]);
        let context = g.node(prefix, "Reshape", &[&context, &merged], vec![]);

        self.c_proj.lower(g, &join_name(prefix, "c_proj"), &context)
    }
}

impl Lower for Embedding {
    /// Token lookup: `ids [batch, seq]` to `[batch, seq, dim]`.
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String> {
        let table = g.add_float_initializer(&join_name(prefix, "weight"), self.weight.view().into_dyn());
        Ok(g.node(prefix, "Gather", &[&table, input], vec![attr_int("axis", 0)]))
    }
}

impl Embedding {
    /// Rows `0..seq` of the table as a `[seq, dim]` tensor, using the sequence
    /// length tracked by the builder.
    pub fn lower_positions(&self, g: &mut GraphBuilder, prefix: &str) -> Result<String> {
        let len = g.sequence_length()?;
        ensure!(self.num_embeddings() > 0, "position table {} is empty", prefix);
        let table = g.add_float_initializer(&join_name(prefix, "weight"), self.weight.view().into_dyn());
        let starts = g.int64_vector(&format!("{}/starts", prefix), &[0]);
        let axes = g.int64_vector(&format!("{}/axes", prefix), &[0]);
        Ok(g.node(prefix, "Slice", &[&table, &starts, &len, &axes], vec![]))
    }
}
