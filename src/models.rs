// src/models.rs

//! Structured description of an input line, as produced by the parser and
//! consumed by the executor, plus the resolved runtime configuration.

use crate::constants::{DEFAULT_MAX_LINE_LENGTH, DEFAULT_PROMPT};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

// --- LINE MODELS ---

/// The standard stream a redirection replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard input (descriptor 0).
    Input,
    /// Standard output (descriptor 1).
    Output,
}

/// How a redirection target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `< path`: read-only, replaces standard input.
    Input,
    /// `> path`: write, create if absent, truncate if present.
    Truncate,
    /// `>> path`: write, create if absent, never truncate.
    Append,
}

impl RedirectMode {
    /// The stream this mode substitutes.
    pub fn stream(self) -> Stream {
        match self {
            Self::Input => Stream::Input,
            Self::Truncate | Self::Append => Stream::Output,
        }
    }
}

/// A request to replace one standard stream of a command with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub path: PathBuf,
    pub mode: RedirectMode,
}

/// One program invocation: its argument vector and its redirections, in the
/// order they were written. Words are kept as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<OsString>,
    pub redirections: Vec<Redirection>,
}

impl Command {
    /// The program name, if the command has any words at all.
    pub fn program(&self) -> Option<&OsStr> {
        self.argv.first().map(OsString::as_os_str)
    }

    /// True when the argument vector is empty.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

/// A chain of commands, each one's output feeding the next one's input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

impl Pipeline {
    /// A pipeline with nothing to run: no commands, or a single empty one.
    pub fn is_blank(&self) -> bool {
        match self.commands.as_slice() {
            [] => true,
            [only] => only.is_empty(),
            _ => false,
        }
    }

    /// True when a multi-command pipeline has a member with no words, which
    /// makes the whole line malformed.
    pub fn has_empty_link(&self) -> bool {
        self.commands.len() > 1 && self.commands.iter().any(Command::is_empty)
    }
}

/// One input line: its pipelines, left to right, and whether the whole line
/// runs in the background.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub pipelines: Vec<Pipeline>,
    pub background: bool,
}

// --- CONFIGURATION MODELS ---

/// The fully resolved runtime configuration of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Text written before each read on an interactive session.
    pub prompt: String,
    /// Longest accepted line, in bytes, not counting the terminator.
    pub max_line_length: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// One layer of configuration as read from a `config.toml` file.
/// Absent keys leave the lower layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub prompt: Option<String>,
    pub max_line_length: Option<usize>,
}
