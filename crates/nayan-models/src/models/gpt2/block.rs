use anyhow::Result;
use ndarray::Array3;
use rand::Rng;

use nayan_transformers::onnx::{GraphBuilder, Lower};
use nayan_transformers::traits::{join_name, Param, ParamMut, Parameterized};
use nayan_transformers::{CausalSelfAttention, LayerNorm, Mlp};

use super::Gpt2Config;

/// Pre-norm transformer block: `x + attn(ln_1(x))`, then `x + mlp(ln_2(x))`.
#[derive(Debug, Clone)]
pub struct Block {
    pub ln_1: LayerNorm,
    pub attn: CausalSelfAttention,
    pub ln_2: LayerNorm,
    pub mlp: Mlp,
}

impl Block {
    pub fn init<R: Rng + ?Sized>(config: &Gpt2Config, rng: &mut R) -> Result<Self> {
        Ok(Self {
            ln_1: LayerNorm::init(config.n_embd, config.layer_norm_eps),
            attn: CausalSelfAttention::init(config.n_embd, config.n_head, rng)?,
            ln_2: LayerNorm::init(config.n_embd, config.layer_norm_eps),
            mlp: Mlp::init(config.n_embd, rng),
        })
    }

    pub fn forward(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>> {
        let attn_out = self.attn.forward(&self.ln_1.forward_3d(hidden_states))?;
        let hidden_states = hidden_states + &attn_out;
        let mlp_out = self.mlp.forward(&self.ln_2.forward_3d(&hidden_states))?;
        Ok(hidden_states + &mlp_out)
    }
}

impl Parameterized for Block {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        self.ln_1.visit_parameters(&join_name(prefix, "ln_1"), f);
        self.attn.visit_parameters(&join_name(prefix, "attn"), f);
        self.ln_2.visit_parameters(&join_name(prefix, "ln_2"), f);
        self.mlp.visit_parameters(&join_name(prefix, "mlp"), f);
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        self.ln_1.visit_parameters_mut(&join_name(prefix, "ln_1"), f)?;
        self.attn.visit_parameters_mut(&join_name(prefix, "attn"), f)?;
        self.ln_2.visit_parameters_mut(&join_name(prefix, "ln_2"), f)?;
        self.mlp.visit_parameters_mut(&join_name(prefix, "mlp"), f)
    }
}

impl Lower for Block {
    fn lower(&self, g: &mut GraphBuilder, prefix: &str, input: &str) -> Result<String> {
        let h = self.ln_1.lower(g, &join_name(prefix, "ln_1"), input)?;
        let h = self.attn.lower(g, &join_name(prefix, "attn"), &h)?;
        let x = g.node(prefix, "Add", &[input, &h], vec![]);

        let h = self.ln_2.lower(g, &join_name(prefix, "ln_2"), &x)?;
        let h = self.mlp.lower(g, &join_name(prefix, "mlp"), &h)?;
        Ok(g.node(prefix, "Add", &[&x, &h], vec![]))
    }
}
