use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nayan")]
#[command(about = "Convert GPT-2 checkpoints into ONNX graphs for mobile inference", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Convert a safetensors checkpoint into an ONNX model
    Convert {
        /// Checkpoint file
        checkpoint: PathBuf,

        /// Output path (defaults to the checkpoint path with an .onnx extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON file with model hyperparameters (defaults to the nayan model)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// ONNX operator set
        #[arg(long, default_value_t = 13)]
        opset: i64,

        /// Emit weight transposes and splits as graph nodes
        #[arg(long)]
        no_constant_folding: bool,

        /// Seed for weight initialisation and the dummy input
        #[arg(long)]
        seed: Option<u64>,

        /// Fail when checkpoint keys do not match the model exactly
        #[arg(long)]
        strict: bool,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Suppress progress messages
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show size and structure of an exported model
    Inspect {
        /// ONNX file
        path: PathBuf,

        /// Decode the graph and list inputs, outputs and operators
        #[arg(short, long)]
        detailed: bool,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_defaults() {
        let cli = Cli::try_parse_from(["nayan", "convert", "ckpt.safetensors"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert_eq!(
            cli.command,
            Commands::Convert {
                checkpoint: PathBuf::from("ckpt.safetensors"),
                output: None,
                config: None,
                opset: 13,
                no_constant_folding: false,
                seed: None,
                strict: false,
                format: "text".to_string(),
                quiet: false,
            }
        );
    }

    #[test]
    fn test_convert_flags() {
        let cli = Cli::try_parse_from([
            "nayan", "-vv", "convert", "in.safetensors", "-o", "out.onnx", "--opset", "14",
            "--no-constant-folding", "--seed", "7", "--strict", "-f", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Convert {
                output,
                opset,
                no_constant_folding,
                seed,
                strict,
                format,
                ..
            } => {
                assert_eq!(output, Some(PathBuf::from("out.onnx")));
                assert_eq!(opset, 14);
                assert!(no_constant_folding);
                assert_eq!(seed, Some(7));
                assert!(strict);
                assert_eq!(format, "json");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_inspect_requires_path() {
        assert!(Cli::try_parse_from(["nayan", "inspect"]).is_err());
        let cli = Cli::try_parse_from(["nayan", "inspect", "m.onnx", "--detailed"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect { detailed: true, .. }));
    }
}
