//! Types for the converter module.

use std::path::PathBuf;

use nayan_models::LoadReport;
use nayan_transformers::onnx::DEFAULT_OPSET;
use serde::Serialize;
use thiserror::Error;

use crate::BYTES_PER_MB;

/// Errors raised by the conversion stages, one variant per stage.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Failed to create model architecture: {0:#}")]
    ModelArchitecture(#[source] anyhow::Error),

    #[error("Failed to load checkpoint file: {0:#}")]
    CheckpointLoad(#[source] anyhow::Error),

    #[error("Failed to extract state dict: {0:#}")]
    StateDictExtraction(#[source] anyhow::Error),

    #[error("Failed to load model weights: {0:#}")]
    WeightLoad(#[source] anyhow::Error),

    #[error("Failed to create dummy input: {0:#}")]
    DummyInput(#[source] anyhow::Error),

    #[error("ONNX export failed: {0:#}")]
    Export(#[source] anyhow::Error),

    #[error("ONNX file was not created")]
    OutputMissing,

    /// A panic escaped one of the stages.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ConvertError {
    /// The stage that failed, `None` for panics.
    pub fn stage(&self) -> Option<ConversionStage> {
        match self {
            ConvertError::InputNotFound(_) => Some(ConversionStage::ValidateInput),
            ConvertError::ModelArchitecture(_) => Some(ConversionStage::BuildModel),
            ConvertError::CheckpointLoad(_) => Some(ConversionStage::LoadCheckpoint),
            ConvertError::StateDictExtraction(_) => Some(ConversionStage::ExtractStateDict),
            ConvertError::WeightLoad(_) => Some(ConversionStage::LoadWeights),
            ConvertError::DummyInput(_) => Some(ConversionStage::CreateDummyInput),
            ConvertError::Export(_) => Some(ConversionStage::ExportOnnx),
            ConvertError::OutputMissing => Some(ConversionStage::VerifyOutput),
            ConvertError::Unexpected(_) => None,
        }
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// The eight conversion stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStage {
    ValidateInput,
    BuildModel,
    LoadCheckpoint,
    ExtractStateDict,
    LoadWeights,
    CreateDummyInput,
    ExportOnnx,
    VerifyOutput,
}

impl ConversionStage {
    pub const ALL: [ConversionStage; 8] = [
        ConversionStage::ValidateInput,
        ConversionStage::BuildModel,
        ConversionStage::LoadCheckpoint,
        ConversionStage::ExtractStateDict,
        ConversionStage::LoadWeights,
        ConversionStage::CreateDummyInput,
        ConversionStage::ExportOnnx,
        ConversionStage::VerifyOutput,
    ];

    /// 1-based position of the stage.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            ConversionStage::ValidateInput => "Validating input file",
            ConversionStage::BuildModel => "Creating model architecture",
            ConversionStage::LoadCheckpoint => "Loading checkpoint",
            ConversionStage::ExtractStateDict => "Extracting state dict",
            ConversionStage::LoadWeights => "Loading model weights",
            ConversionStage::CreateDummyInput => "Creating dummy input",
            ConversionStage::ExportOnnx => "Exporting to ONNX",
            ConversionStage::VerifyOutput => "Verifying output file",
        }
    }

    /// Fraction of the work done once this stage starts.
    pub fn progress(self) -> f32 {
        (self.number() - 1) as f32 / Self::ALL.len() as f32
    }
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.number(), Self::ALL.len(), self.label())
    }
}

/// Knobs for a conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// ONNX operator set to target.
    pub opset: i64,
    /// Pre-transpose and pre-split weights instead of emitting layout nodes.
    pub constant_folding: bool,
    /// Seed for weight initialisation and the dummy input. Random when `None`.
    pub seed: Option<u64>,
    /// Fail on missing or unexpected checkpoint keys.
    pub strict: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            opset: DEFAULT_OPSET,
            constant_folding: true,
            seed: None,
            strict: false,
        }
    }
}

/// Details of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionOutcome {
    pub output: PathBuf,
    pub bytes: u64,
    pub container: &'static str,
    pub load_report: LoadReport,
}

impl ConversionOutcome {
    pub fn model_size_mb(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_MB
    }
}

/// The record handed back to callers of [`crate::convert`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_size_mb: Option<f64>,
}

impl ConversionResult {
    pub fn succeeded(outcome: &ConversionOutcome) -> Self {
        Self {
            success: true,
            message: format!("Successfully converted model to {}", outcome.output.display()),
            model_size_mb: Some(outcome.model_size_mb()),
        }
    }

    pub fn failed(error: &ConvertError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            model_size_mb: None,
        }
    }
}

impl From<ConvertResult<ConversionOutcome>> for ConversionResult {
    fn from(result: ConvertResult<ConversionOutcome>) -> Self {
        match result {
            Ok(outcome) => Self::succeeded(&outcome),
            Err(e) => Self::failed(&e),
        }
    }
}
