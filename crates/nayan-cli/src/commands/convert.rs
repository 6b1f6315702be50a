//! Convert a checkpoint into an ONNX model

use std::path::Path;

use anyhow::Result;
use colored::*;

use nayan::{
    default_output_path, ConversionResult, ConvertError, ConvertOptions, Converter, Gpt2Config,
};

use crate::commands::display::{self, Format};

#[allow(clippy::too_many_arguments)]
pub fn run(
    checkpoint: &Path,
    output: Option<&Path>,
    config: Option<&Path>,
    opset: i64,
    no_constant_folding: bool,
    seed: Option<u64>,
    strict: bool,
    format: &str,
    quiet: bool,
) -> Result<bool> {
    let format = Format::parse(format)?;
    let config = match config {
        Some(path) => {
            log::info!("using model config from {:?}", path);
            match Gpt2Config::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    let failed = ConversionResult::failed(&ConvertError::ModelArchitecture(e));
                    print!("{}", format_result(&failed, format)?);
                    return Ok(false);
                }
            }
        }
        None => Gpt2Config::default(),
    };
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(checkpoint));

    log::debug!("converting {:?} -> {:?}", checkpoint, output);

    let converter = Converter::new(config).with_options(ConvertOptions {
        opset,
        constant_folding: !no_constant_folding,
        seed,
        strict,
    });

    let show_progress = !quiet && format == Format::Text;
    let result = converter.convert_with_progress(checkpoint, &output, |stage| {
        if show_progress {
            eprintln!("{}", stage.to_string().dimmed());
        }
    });

    print!("{}", format_result(&result, format)?);
    Ok(result.success)
}

fn format_result(result: &ConversionResult, format: Format) -> Result<String> {
    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(result)?)),
        Format::Text => {
            if result.success {
                let size = result.model_size_mb.map(display::megabytes).unwrap_or_default();
                Ok(format!("{} {}\n", display::success_line(&result.message), size.dimmed()))
            } else {
                Ok(format!("{}\n", display::failure_line(&result.message)))
            }
        }
    }
}
