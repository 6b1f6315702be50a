//! Position-wise feed-forward network of a GPT-2 block.

use anyhow::Result;
use ndarray::Array3;
use rand::Rng;

use crate::activations::gelu;
use crate::linear_layer::LinearLayer;
use crate::traits::{join_name, Param, ParamMut, Parameterized};

/// Hidden width multiplier of the MLP.
pub const MLP_EXPANSION: usize = 4;

/// `c_proj(gelu(c_fc(x)))`, expanding to `4 * n_embd` and back.
#[derive(Debug, Clone)]
pub struct Mlp {
    pub c_fc: LinearLayer,
    pub c_proj: LinearLayer,
}

impl Mlp {
    pub fn new(c_fc: LinearLayer, c_proj: LinearLayer) -> Self {
        Self { c_fc, c_proj }
    }

    pub fn init<R: Rng + ?Sized>(n_embd: usize, rng: &mut R) -> Self {
        let hidden = MLP_EXPANSION * n_embd;
        Self {
            c_fc: LinearLayer::init(n_embd, hidden, true, rng),
            c_proj: LinearLayer::init(hidden, n_embd, true, rng),
        }
    }

    pub fn forward(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        let (batch, seq, n_embd) = hidden.dim();

        // Ensure contiguous layout before reshape
        let hidden_contig = hidden.as_standard_layout();
        let hidden_2d = hidden_contig.view().into_shape_with_order((batch * seq, n_embd))?;

        let mut intermediate = self.c_fc.matmul(&hidden_2d);
        gelu(&mut intermediate);

        let output = self.c_proj.matmul(&intermediate.view());

        Ok(output.into_shape_with_order((batch, seq, self.c_proj.out_features()))?)
    }
}

impl Parameterized for Mlp {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        self.c_fc.visit_parameters(&join_name(prefix, "c_fc"), f);
        self.c_proj.visit_parameters(&join_name(prefix, "c_proj"), f);
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        self.c_fc.visit_parameters_mut(&join_name(prefix, "c_fc"), f)?;
        self.c_proj.visit_parameters_mut(&join_name(prefix, "c_proj"), f)
    }
}
