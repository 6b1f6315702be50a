mod commands;

use anyhow::Result;
use clap::Parser;

use nayan_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let success = match cli.command {
        Commands::Convert {
            checkpoint,
            output,
            config,
            opset,
            no_constant_folding,
            seed,
            strict,
            format,
            quiet,
        } => commands::convert::run(
            &checkpoint,
            output.as_deref(),
            config.as_deref(),
            opset,
            no_constant_folding,
            seed,
            strict,
            &format,
            quiet,
        )?,

        Commands::Inspect {
            path,
            detailed,
            format,
        } => commands::inspect::run(&path, detailed, &format)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
