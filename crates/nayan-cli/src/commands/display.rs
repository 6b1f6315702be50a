use anyhow::{anyhow, Result};
use colored::*;

/// Output formats shared by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn parse(format: &str) -> Result<Self> {
        match format {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(anyhow!("Unknown format: '{}'. Use: json, text", other)),
        }
    }
}

pub fn success_line(message: &str) -> ColoredString {
    format!("✓ {}", message).green()
}

pub fn failure_line(message: &str) -> ColoredString {
    format!("✗ {}", message).red()
}

/// `label: value` with a dimmed, padded label.
pub fn field(label: &str, value: impl std::fmt::Display) -> String {
    format!("  {} {}", format!("{:<14}", format!("{}:", label)).dimmed(), value)
}

pub fn megabytes(mb: f64) -> String {
    format!("{:.2} MB", mb)
}
