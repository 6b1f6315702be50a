use std::collections::BTreeMap;

use anyhow::{bail, ensure, Result};
use ndarray::{Array3, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use nayan_transformers::traits::{join_name, Param, ParamMut, Parameterized};
use nayan_transformers::{Embedding, LayerNorm, LinearLayer, StateDict};

use super::{Block, Gpt2Config};

/// Whether the weights may still change.
///
/// Dropout is never applied by the forward pass, so the mode only gates weight
/// loading and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelMode {
    Train,
    Eval,
}

/// Outcome of a non-strict [`Gpt::load_state_dict`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub missing_keys: Vec<String>,
    pub unexpected_keys: Vec<String>,
}

impl LoadReport {
    /// Every model parameter was found and nothing was left over.
    pub fn is_exact(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty()
    }
}

/// GPT-2 language model with nanoGPT parameter naming.
#[derive(Debug, Clone)]
pub struct Gpt {
    config: Gpt2Config,
    pub(crate) wte: Embedding,
    pub(crate) wpe: Embedding,
    pub(crate) h: Vec<Block>,
    pub(crate) ln_f: LayerNorm,
    pub(crate) lm_head: LinearLayer,
    mode: ModelMode,
}

impl Gpt {
    /// Builds a randomly initialised model in [`ModelMode::Train`].
    pub fn new(config: Gpt2Config) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::from_entropy())
    }

    pub fn with_seed(config: Gpt2Config, seed: u64) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::seed_from_u64(seed))
    }

    pub fn with_rng<R: Rng + ?Sized>(config: Gpt2Config, rng: &mut R) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "building GPT: {} layers, {} heads, n_embd {}, block_size {}, vocab {}",
            config.n_layer,
            config.n_head,
            config.n_embd,
            config.block_size,
            config.vocab_size
        );

        let wte = Embedding::init(config.vocab_size, config.n_embd, rng);
        let wpe = Embedding::init(config.block_size, config.n_embd, rng);
        let h = (0..config.n_layer)
            .map(|_| Block::init(&config, rng))
            .collect::<Result<Vec<_>>>()?;
        let ln_f = LayerNorm::init(config.n_embd, config.layer_norm_eps);
        let lm_head = LinearLayer::init(config.n_embd, config.vocab_size, false, rng);

        Ok(Self {
            config,
            wte,
            wpe,
            h,
            ln_f,
            lm_head,
            mode: ModelMode::Train,
        })
    }

    pub fn config(&self) -> &Gpt2Config {
        &self.config
    }

    pub fn mode(&self) -> ModelMode {
        self.mode
    }

    pub fn blocks(&self) -> &[Block] {
        &self.h
    }

    /// Freezes the model. There is no way back to [`ModelMode::Train`].
    pub fn eval(&mut self) {
        self.mode = ModelMode::Eval;
    }

    /// Copies matching tensors from `state_dict` into the model.
    ///
    /// Shapes are checked for every matching key before anything is written, so
    /// a failed load leaves the model untouched. With `strict`, missing or
    /// unexpected keys are errors too.
    pub fn load_state_dict(&mut self, state_dict: &StateDict, strict: bool) -> Result<LoadReport> {
        ensure!(
            self.mode == ModelMode::Train,
            "cannot load weights into a model in eval mode"
        );

        let mut expected: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        self.visit_parameters("", &mut |name, param| {
            expected.insert(name, param.shape().to_vec());
        });

        let mut missing_keys = Vec::new();
        let mut mismatches = Vec::new();
        for (name, shape) in &expected {
            match state_dict.get(name) {
                None => missing_keys.push(name.clone()),
                Some(t) if t.shape() != shape.as_slice() => mismatches.push(format!(
                    "size mismatch for {}: copying a param with shape {:?} from checkpoint, \
                     the shape in current model is {:?}.",
                    name,
                    t.shape(),
                    shape
                )),
                Some(_) => {}
            }
        }
        let unexpected_keys: Vec<String> = state_dict
            .keys()
            .filter(|k| !expected.contains_key(*k))
            .map(str::to_string)
            .collect();

        if !mismatches.is_empty() {
            bail!("Error(s) in loading state_dict for GPT:\n\t{}", mismatches.join("\n\t"));
        }
        if strict && (!missing_keys.is_empty() || !unexpected_keys.is_empty()) {
            bail!(
                "Error(s) in loading state_dict for GPT: missing keys {:?}, unexpected keys {:?}",
                missing_keys,
                unexpected_keys
            );
        }

        let mut loaded = 0;
        self.visit_parameters_mut("", &mut |name, mut param| {
            if let Some(src) = state_dict.get(&name) {
                param.assign(&name, src)?;
                loaded += 1;
            }
            Ok(())
        })?;

        if loaded == 0 {
            log::warn!(
                "none of the {} checkpoint tensors matched a model parameter; weights stay randomly initialised",
                state_dict.len()
            );
        } else if !missing_keys.is_empty() || !unexpected_keys.is_empty() {
            log::warn!(
                "loaded {} parameters, {} missing, {} unexpected",
                loaded,
                missing_keys.len(),
                unexpected_keys.len()
            );
        } else {
            log::info!("loaded all {} parameters", loaded);
        }

        Ok(LoadReport {
            loaded,
            missing_keys,
            unexpected_keys,
        })
    }

    /// The model's own weights, keyed like a training checkpoint.
    pub fn state_dict(&self) -> StateDict {
        let mut state_dict = StateDict::new();
        self.visit_parameters("", &mut |name, param| {
            state_dict.insert(name, param.to_dyn());
        });
        state_dict
    }

    /// `[batch, seq]` token ids to `[batch, seq, vocab_size]` logits.
    pub fn forward(&self, input_ids: &ArrayView2<i64>) -> Result<Array3<f32>> {
        let (_, t) = input_ids.dim();
        ensure!(
            t <= self.config.block_size,
            "Cannot forward sequence of length {}, block size is {}",
            t,
            self.config.block_size
        );

        let tok_emb = self.wte.forward(input_ids)?;
        let pos_emb = self.wpe.positions(t)?;
        let mut x = tok_emb + &pos_emb;

        for block in &self.h {
            x = block.forward(&x)?;
        }

        let x = self.ln_f.forward_3d(&x);
        self.lm_head.forward(&x)
    }
}

impl Parameterized for Gpt {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        let transformer = join_name(prefix, "transformer");
        self.wte.visit_parameters(&join_name(&transformer, "wte"), f);
        self.wpe.visit_parameters(&join_name(&transformer, "wpe"), f);
        for (i, block) in self.h.iter().enumerate() {
            block.visit_parameters(&format!("{}.h.{}", transformer, i), f);
        }
        self.ln_f.visit_parameters(&join_name(&transformer, "ln_f"), f);
        self.lm_head.visit_parameters(&join_name(prefix, "lm_head"), f);
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        let transformer = join_name(prefix, "transformer");
        self.wte.visit_parameters_mut(&join_name(&transformer, "wte"), f)?;
        self.wpe.visit_parameters_mut(&join_name(&transformer, "wpe"), f)?;
        for (i, block) in self.h.iter_mut().enumerate() {
            block.visit_parameters_mut(&format!("{}.h.{}", transformer, i), f)?;
        }
        self.ln_f.visit_parameters_mut(&join_name(&transformer, "ln_f"), f)?;
        self.lm_head.visit_parameters_mut(&join_name(prefix, "lm_head"), f)
    }
}
