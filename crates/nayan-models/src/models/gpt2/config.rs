use std::path::Path;

use anyhow::{ensure, Context, Result};
use nayan_transformers::normalization::DEFAULT_LAYER_NORM_EPS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gpt2Config {
    pub n_layer: usize,
    pub n_head: usize,
    pub n_embd: usize,
    #[serde(alias = "n_positions")]
    pub block_size: usize, // max sequence length
    pub vocab_size: usize,
    #[serde(default)]
    pub dropout: f32,
    #[serde(default = "default_layer_norm_eps", alias = "layer_norm_epsilon")]
    pub layer_norm_eps: f32,
}

fn default_layer_norm_eps() -> f32 {
    DEFAULT_LAYER_NORM_EPS
}

impl Default for Gpt2Config {
    /// The hyperparameters of the nayan checkpoints.
    fn default() -> Self {
        Self {
            n_layer: 6,
            n_head: 6,
            n_embd: 384,
            block_size: 1024,
            vocab_size: 50304,
            dropout: 0.0,
            layer_norm_eps: DEFAULT_LAYER_NORM_EPS,
        }
    }
}

impl Gpt2Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        Self::from_json(&json).with_context(|| format!("invalid config {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_layer > 0, "n_layer must be greater than 0");
        ensure!(self.n_head > 0, "n_head must be greater than 0");
        ensure!(
            self.n_embd % self.n_head == 0,
            "n_embd ({}) must be divisible by n_head ({})",
            self.n_embd,
            self.n_head
        );
        ensure!(self.block_size > 0, "block_size must be greater than 0");
        ensure!(self.vocab_size > 0, "vocab_size must be greater than 0");
        ensure!(
            (0.0..1.0).contains(&self.dropout),
            "dropout must be in [0, 1), got {}",
            self.dropout
        );
        ensure!(self.layer_norm_eps > 0.0, "layer_norm_eps must be positive");
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }
}
