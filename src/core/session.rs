// src/core/session.rs

//! The read-execute loop.
//!
//! A [`Session`] pulls bytes through the [`LineFramer`], parses each line,
//! and hands it to the executor. Malformed input is reported and skipped;
//! only a failure of the controller itself (reading input, creating pipes
//! or processes) ends the loop with an error.

use crate::{
    core::{
        framer::{FrameEvent, LineFramer},
        parser, reporter,
    },
    models::ShellConfig,
    system::executor::{self, LineOutcome},
};
use anyhow::{Context, Result};
use std::io::{self, Read, Write};

/// One shell session over an input stream.
#[derive(Debug)]
pub struct Session<R: Read> {
    framer: LineFramer,
    input: R,
    config: ShellConfig,
    interactive: bool,
}

impl<R: Read> Session<R> {
    /// `interactive` turns on the prompt and background reports.
    pub fn new(config: ShellConfig, input: R, interactive: bool) -> Self {
        Self {
            framer: LineFramer::new(config.max_line_length),
            input,
            config,
            interactive,
        }
    }

    /// Runs until end of input or until a line asks to terminate.
    pub fn run(&mut self) -> Result<()> {
        log::debug!(
            "Session started (interactive: {}, max line length: {}).",
            self.interactive,
            self.framer.max_line_length()
        );
        loop {
            while let Some(event) = self.framer.next_event() {
                if self.handle(event)? == LineOutcome::Terminate {
                    log::debug!("Session terminated by request.");
                    return Ok(());
                }
            }

            if self.interactive {
                self.prompt()?;
            }

            if self.framer.fill_from(&mut self.input)? == 0 {
                if let Some(event) = self.framer.finish() {
                    self.handle(event)?;
                }
                log::debug!("End of input.");
                return Ok(());
            }
        }
    }

    fn prompt(&self) -> Result<()> {
        let mut stdout = io::stdout().lock();
        reporter::report_completions(&mut stdout)?;
        write!(stdout, "{}", self.config.prompt)
            .and_then(|()| stdout.flush())
            .context("Failed to write the prompt")
    }

    fn handle(&self, event: FrameEvent) -> Result<LineOutcome> {
        match event {
            FrameEvent::Overlong => {
                log::debug!("Rejected an over-length line.");
                report_syntax_error();
                Ok(LineOutcome::Continue)
            }
            FrameEvent::Line(bytes) => run_line(&bytes),
        }
    }
}

fn report_syntax_error() {
    eprintln!(t!("shell.error.syntax"));
}

fn run_line(bytes: &[u8]) -> Result<LineOutcome> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(LineOutcome::Continue);
    }

    let text = String::from_utf8_lossy(bytes);
    let line = match parser::parse_line(bytes) {
        Ok(line) => line,
        Err(e) => {
            log::debug!("Parse error in {:?}: {}", text, e);
            report_syntax_error();
            return Ok(LineOutcome::Continue);
        }
    };

    match executor::execute_line(&line) {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_syntax_error() => {
            log::debug!("Rejected {:?}: {}", text, e);
            report_syntax_error();
            Ok(LineOutcome::Continue)
        }
        Err(e) => Err(e.into()),
    }
}
