// src/bin/pipesh.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pipesh::{
    cli::Cli,
    core::{config_loader, session::Session},
    system::signals,
    t,
};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;

/// The main entry point of `pipesh`.
/// Sets up logging, parses arguments, runs the session, and performs
/// centralized error handling.
fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{}: {:#}", t!("cli.error.label").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let config = config_loader::load_config(&cli.overrides())?;
    signals::install_handlers().context("Failed to install signal handlers")?;

    let stdin = io::stdin();
    let interactive = cli.interactive || stdin.is_terminal();

    // The framer keeps its own buffer, so reads go straight to the descriptor.
    let input = File::from(
        stdin
            .as_fd()
            .try_clone_to_owned()
            .context("Failed to duplicate standard input")?,
    );

    Session::new(config, input, interactive).run()
}
