use std::path::Path;

use anyhow::{ensure, Result};

use nayan_transformers::onnx::{pb, write_model, DataType, Dim, GraphBuilder, Lower, DEFAULT_OPSET};

use super::{Gpt, ModelMode};

pub const INPUT_NAME: &str = "input_ids";
pub const OUTPUT_NAME: &str = "logits";
pub const BATCH_AXIS: &str = "batch_size";
pub const SEQUENCE_AXIS: &str = "sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub opset: i64,
    pub constant_folding: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            opset: DEFAULT_OPSET,
            constant_folding: true,
        }
    }
}

impl Gpt {
    /// Lowers the model into an ONNX graph with dynamic batch and sequence axes.
    ///
    /// The graph takes `input_ids: int64 [batch_size, sequence]` and produces
    /// `logits: float [batch_size, sequence, vocab_size]`. The model must be in
    /// [`ModelMode::Eval`].
    pub fn to_onnx(&self, options: &ExportOptions) -> Result<pb::ModelProto> {
        ensure!(
            self.mode() == ModelMode::Eval,
            "model must be switched to eval mode before export"
        );
        let config = self.config();
        let mut g = GraphBuilder::new(options.constant_folding);

        let ids = g.add_input(
            INPUT_NAME,
            DataType::Int64,
            &[Dim::symbolic(BATCH_AXIS), Dim::symbolic(SEQUENCE_AXIS)],
        );
        g.track_sequence(&ids, config.block_size);

        let tok_emb = self.wte.lower(&mut g, "transformer.wte", &ids)?;
        let pos_emb = self.wpe.lower_positions(&mut g, "transformer.wpe")?;
        let mut x = g.node("transformer", "Add", &[&tok_emb, &pos_emb], vec![]);

        for (i, block) in self.h.iter().enumerate() {
            x = block.lower(&mut g, &format!("transformer.h.{}", i), &x)?;
        }

        let x = self.ln_f.lower(&mut g, "transformer.ln_f", &x)?;
        let logits = self.lm_head.lower(&mut g, "lm_head", &x)?;
        g.node_named("Identity", &[&logits], OUTPUT_NAME, vec![]);
        g.add_output(
            OUTPUT_NAME,
            DataType::Float,
            &[
                Dim::symbolic(BATCH_AXIS),
                Dim::symbolic(SEQUENCE_AXIS),
                Dim::Fixed(config.vocab_size as i64),
            ],
        );

        g.add_metadata("n_layer", config.n_layer);
        g.add_metadata("n_head", config.n_head);
        g.add_metadata("n_embd", config.n_embd);
        g.add_metadata("block_size", config.block_size);
        g.add_metadata("vocab_size", config.vocab_size);

        g.into_model("nayan_gpt2", options.opset, env!("CARGO_PKG_VERSION"))
    }

    /// Writes the lowered graph to `path`, returning the file size in bytes.
    pub fn export_onnx(&self, path: &Path, options: &ExportOptions) -> Result<u64> {
        let model = self.to_onnx(options)?;
        let bytes = write_model(&model, path)?;
        log::info!("exported ONNX graph to {:?} ({} bytes)", path, bytes);
        Ok(bytes)
    }
}
