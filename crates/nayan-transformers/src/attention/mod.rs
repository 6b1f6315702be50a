//! Masked multi-head self-attention with a fused QKV projection.

use anyhow::{ensure, Result};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2};
use rand::Rng;

use crate::activations::softmax_rows_inplace;
use crate::linear_layer::LinearLayer;
use crate::traits::{join_name, Param, ParamMut, Parameterized};
use crate::utils::apply_causal_mask;

/// GPT-2 causal self-attention.
///
/// `c_attn` projects `n_embd -> 3 * n_embd` (query, key and value stacked along the
/// output axis), `c_proj` maps the recombined heads back to `n_embd`.
#[derive(Debug, Clone)]
pub struct CausalSelfAttention {
    pub c_attn: LinearLayer,
    pub c_proj: LinearLayer,
    pub n_head: usize,
    pub n_embd: usize,
    pub head_dim: usize,
    pub scale_factor: f32,
}

/// Query, key and value slices of the fused projection.
pub struct QkvParts<'a> {
    pub weights: [ArrayView2<'a, f32>; 3],
    pub biases: Option<[ArrayView1<'a, f32>; 3]>,
}

impl CausalSelfAttention {
    pub fn new(n_embd: usize, n_head: usize, c_attn: LinearLayer, c_proj: LinearLayer) -> Result<Self> {
        ensure!(n_head > 0, "n_head must be greater than 0");
        ensure!(
            n_embd % n_head == 0,
            "n_embd ({}) must be divisible by n_head ({})",
            n_embd,
            n_head
        );
        ensure!(
            c_attn.weight.dim() == (3 * n_embd, n_embd),
            "c_attn weight must be [{}, {}], got {:?}",
            3 * n_embd,
            n_embd,
            c_attn.weight.shape()
        );
        ensure!(
            c_proj.weight.dim() == (n_embd, n_embd),
            "c_proj weight must be [{}, {}], got {:?}",
            n_embd,
            n_embd,
            c_proj.weight.shape()
        );

        let head_dim = n_embd / n_head;
        Ok(Self {
            c_attn,
            c_proj,
            n_head,
            n_embd,
            head_dim,
            scale_factor: 1.0 / (head_dim as f32).sqrt(),
        })
    }

    /// Randomly initialised attention block.
    ///
    /// The head-count check happens before any weight is allocated.
    pub fn init<R: Rng + ?Sized>(n_embd: usize, n_head: usize, rng: &mut R) -> Result<Self> {
        ensure!(n_head > 0, "n_head must be greater than 0");
        ensure!(
            n_embd % n_head == 0,
            "n_embd ({}) must be divisible by n_head ({})",
            n_embd,
            n_head
        );
        let c_attn = LinearLayer::init(n_embd, 3 * n_embd, true, rng);
        let c_proj = LinearLayer::init(n_embd, n_embd, true, rng);
        Self::new(n_embd, n_head, c_attn, c_proj)
    }

    /// Splits `c_attn` into its query, key and value blocks.
    pub fn qkv_parts(&self) -> QkvParts<'_> {
        let c = self.n_embd;
        let w = &self.c_attn.weight;
        let weights = [
            w.slice(s![0..c, ..]),
            w.slice(s![c..2 * c, ..]),
            w.slice(s![2 * c..3 * c, ..]),
        ];
        let biases = self.c_attn.bias.as_ref().map(|b| {
            [
                b.slice(s![0..c]),
                b.slice(s![c..2 * c]),
                b.slice(s![2 * c..3 * c]),
            ]
        });
        QkvParts { weights, biases }
    }

    /// `[batch, seq, n_embd] -> [batch, seq, n_embd]`.
    pub fn forward(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>> {
        let (batch, seq_len, _) = hidden_states.dim();
        let c = self.n_embd;

        // 1. Fused projection: [batch, seq, 3 * n_embd]
        let qkv = self.c_attn.forward(hidden_states)?;

        // 2. Per (batch, head) scaled dot-product attention
        let mut context = Array3::<f32>::zeros((batch, seq_len, c));
        for b in 0..batch {
            for h in 0..self.n_head {
                let lo = h * self.head_dim;
                let hi = lo + self.head_dim;
                let q = qkv.slice(s![b, .., lo..hi]);
                let k = qkv.slice(s![b, .., c + lo..c + hi]);
                let v = qkv.slice(s![b, .., 2 * c + lo..2 * c + hi]);

                let mut scores: Array2<f32> = q.dot(&k.t()) * self.scale_factor;
                apply_causal_mask(&mut scores);
                softmax_rows_inplace(&mut scores);

                context.slice_mut(s![b, .., lo..hi]).assign(&scores.dot(&v));
            }
        }

        // 3. Output projection
        self.c_proj.forward(&context)
    }
}

impl Parameterized for CausalSelfAttention {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        self.c_attn.visit_parameters(&join_name(prefix, "c_attn"), f);
        self.c_proj.visit_parameters(&join_name(prefix, "c_proj"), f);
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        self.c_attn.visit_parameters_mut(&join_name(prefix, "c_attn"), f)?;
        self.c_proj.visit_parameters_mut(&join_name(prefix, "c_proj"), f)
    }
}
