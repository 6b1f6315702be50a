use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nayan_models::{ExportOptions, Gpt, Gpt2Config};

use super::checkpoint::{load_checkpoint, remove_orig_mod_prefix, CheckpointContainer};
use super::types::{
    ConversionOutcome, ConversionResult, ConversionStage, ConvertError, ConvertOptions, ConvertResult,
};

/// Random token ids of shape `[1, block_size]` in `[0, vocab_size)`.
pub fn dummy_input<R: Rng + ?Sized>(config: &Gpt2Config, rng: &mut R) -> Result<Array2<i64>> {
    ensure!(config.vocab_size > 0, "vocab_size must be greater than 0");
    ensure!(config.block_size > 0, "block_size must be greater than 0");
    let high = i64::try_from(config.vocab_size)?;
    Ok(Array2::random_using(
        (1, config.block_size),
        Uniform::new(0i64, high),
        rng,
    ))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs the conversion pipeline for one model configuration.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: Gpt2Config,
    options: ConvertOptions,
}

impl Converter {
    pub fn new(config: Gpt2Config) -> Self {
        Self {
            config,
            options: ConvertOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &Gpt2Config {
        &self.config
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn convert(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> ConversionResult {
        self.convert_with_progress(input, output, |_| {})
    }

    /// Like [`Converter::convert`], calling `progress` before each stage starts.
    pub fn convert_with_progress<F>(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        progress: F,
    ) -> ConversionResult
    where
        F: FnMut(ConversionStage),
    {
        let result = self.run(input.as_ref(), output.as_ref(), progress);
        match &result {
            Ok(outcome) => log::info!(
                "converted {:?} -> {:?} ({:.2} MB)",
                input.as_ref(),
                outcome.output,
                outcome.model_size_mb()
            ),
            Err(e) => log::error!("{}", e),
        }
        result.into()
    }

    /// Runs every stage, stopping at the first failure.
    ///
    /// Panics inside a stage are caught and returned as
    /// [`ConvertError::Unexpected`].
    pub fn run<F>(&self, input: &Path, output: &Path, mut progress: F) -> ConvertResult<ConversionOutcome>
    where
        F: FnMut(ConversionStage),
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(input, output, &mut progress)))
            .unwrap_or_else(|payload| Err(ConvertError::Unexpected(panic_message(payload.as_ref()))))
    }

    fn run_stages(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(ConversionStage),
    ) -> ConvertResult<ConversionOutcome> {
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // 1. Input file
        progress(ConversionStage::ValidateInput);
        if !input.exists() {
            return Err(ConvertError::InputNotFound(input.display().to_string()));
        }

        // 2. Model architecture
        progress(ConversionStage::BuildModel);
        let mut model = Gpt::with_rng(self.config.clone(), &mut rng)
            .map_err(ConvertError::ModelArchitecture)?;

        // 3. Checkpoint
        progress(ConversionStage::LoadCheckpoint);
        let raw = load_checkpoint(input).map_err(ConvertError::CheckpointLoad)?;

        // 4. State dict
        progress(ConversionStage::ExtractStateDict);
        let container = CheckpointContainer::resolve(raw).map_err(ConvertError::StateDictExtraction)?;
        let kind = container.kind();
        log::info!("checkpoint container: {}", kind);
        let state_dict = remove_orig_mod_prefix(container.into_state_dict());

        // 5. Weights
        progress(ConversionStage::LoadWeights);
        let load_report = model
            .load_state_dict(&state_dict, self.options.strict)
            .map_err(ConvertError::WeightLoad)?;
        model.eval();

        // 6. Dummy input
        progress(ConversionStage::CreateDummyInput);
        let dummy = dummy_input(&self.config, &mut rng).map_err(ConvertError::DummyInput)?;

        // 7. Trace and export
        progress(ConversionStage::ExportOnnx);
        let export_options = ExportOptions {
            opset: self.options.opset,
            constant_folding: self.options.constant_folding,
        };
        self.trace_and_export(&model, &dummy, output, &export_options)
            .map_err(ConvertError::Export)?;

        // 8. Output file
        progress(ConversionStage::VerifyOutput);
        let bytes = match std::fs::metadata(output) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(ConvertError::OutputMissing),
        };

        Ok(ConversionOutcome {
            output: output.to_path_buf(),
            bytes,
            container: kind,
            load_report,
        })
    }

    fn trace_and_export(
        &self,
        model: &Gpt,
        dummy: &Array2<i64>,
        output: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        let logits = model.forward(&dummy.view())?;
        let (batch, seq) = dummy.dim();
        let expected = [batch, seq, self.config.vocab_size];
        if logits.shape() != expected {
            return Err(anyhow!(
                "traced logits have shape {:?}, expected {:?}",
                logits.shape(),
                expected
            ));
        }
        log::debug!("traced forward pass with output shape {:?}", logits.shape());

        model.export_onnx(output, options)?;
        Ok(())
    }
}
