// src/cli.rs

use crate::core::config_loader::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

/// pipesh: a small job-control shell.
///
/// Reads command lines from standard input and runs them. Commands joined by
/// `|` form a pipeline, `;` separates pipelines, `<`, `>` and `>>` redirect
/// standard streams, and a trailing `&` runs the whole line in the background.
///
/// Settings are read from `config.toml` in the pipesh config directory and
/// can be overridden by the flags below.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read settings from this file instead of the default `config.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Text shown before each line is read.
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Longest accepted line, in bytes. Longer lines are rejected.
    #[arg(long, value_name = "N")]
    pub max_line_length: Option<usize>,

    /// Show the prompt and background reports even when standard input is
    /// not a terminal.
    #[arg(short, long)]
    pub interactive: bool,
}

impl Cli {
    /// The configuration layer given on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            prompt: self.prompt.clone(),
            max_line_length: self.max_line_length,
        }
    }
}
