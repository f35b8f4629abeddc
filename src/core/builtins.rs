// src/core/builtins.rs

//! Commands executed inside the controlling process.
//!
//! The table is static and never changes at runtime. [`resolve`] decides,
//! from the first word alone, whether a command runs in-process or as a
//! child; only in-process commands are ever invoked here.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a builtin failed. Only ever logged; the user sees one fixed line.
#[derive(Error, Debug)]
pub enum BuiltinError {
    #[error("Wrong number of arguments ({0}).")]
    Arity(usize),
    #[error("'{0}' is not a well-formed integer.")]
    MalformedInteger(String),
    #[error("Signal number {0} is not valid.")]
    InvalidSignal(i32),
    #[error("Could not determine the home directory.")]
    NoHomeDirectory,
    #[error("Filesystem Error: {0}")]
    Io(#[from] io::Error),
    #[error("System call failed: {0}")]
    Os(#[from] nix::Error),
}

/// What a builtin asks the controller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    Continue,
    Terminate,
}

/// The result of invoking a builtin, after any failure has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOutcome {
    Success,
    Terminate,
    Failure,
}

type BuiltinHandler = fn(&[OsString], &mut dyn Write) -> Result<BuiltinAction, BuiltinError>;

/// A command name and the in-process operation behind it.
pub struct BuiltinDefinition {
    pub name: &'static str,
    handler: BuiltinHandler,
}

impl fmt::Debug for BuiltinDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The single source of truth for all builtins.
static BUILTIN_REGISTRY: &[BuiltinDefinition] = &[
    BuiltinDefinition {
        name: "exit",
        handler: terminate,
    },
    BuiltinDefinition {
        name: "lecho",
        handler: echo,
    },
    BuiltinDefinition {
        name: "lcd",
        handler: change_directory,
    },
    BuiltinDefinition {
        name: "lkill",
        handler: send_signal,
    },
    BuiltinDefinition {
        name: "lls",
        handler: list_current_directory,
    },
];

/// Where a command runs.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch {
    /// Inside the controller, through this table entry.
    InProcess(&'static BuiltinDefinition),
    /// As a child process.
    Child,
}

/// Finds a builtin by exact name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDefinition> {
    BUILTIN_REGISTRY.iter().find(|builtin| builtin.name == name)
}

/// Classifies a command by its first word.
pub fn resolve(argv: &[OsString]) -> Dispatch {
    argv.first()
        .and_then(|name| name.to_str())
        .and_then(find_builtin)
        .map_or(Dispatch::Child, Dispatch::InProcess)
}

impl BuiltinDefinition {
    /// Runs the builtin with the full argument vector (slot 0 is the name),
    /// writing its regular output to `out`. A failure is reported on stderr
    /// with a diagnostic naming the builtin.
    pub fn invoke(&self, argv: &[OsString], out: &mut dyn Write) -> BuiltinOutcome {
        log::debug!("Running builtin '{}' with {:?}", self.name, argv);
        match (self.handler)(argv, out) {
            Ok(BuiltinAction::Continue) => BuiltinOutcome::Success,
            Ok(BuiltinAction::Terminate) => BuiltinOutcome::Terminate,
            Err(e) => {
                log::debug!("Builtin '{}' failed: {}", self.name, e);
                eprintln!(t!("shell.error.builtin"), name = self.name);
                BuiltinOutcome::Failure
            }
        }
    }
}

// --- Builtin bodies ---

fn terminate(_argv: &[OsString], _out: &mut dyn Write) -> Result<BuiltinAction, BuiltinError> {
    Ok(BuiltinAction::Terminate)
}

fn echo(argv: &[OsString], out: &mut dyn Write) -> Result<BuiltinAction, BuiltinError> {
    let words = argv.get(1..).unwrap_or_default();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        out.write_all(word.as_bytes())?;
    }
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(BuiltinAction::Continue)
}

fn change_directory(argv: &[OsString], _out: &mut dyn Write) -> Result<BuiltinAction, BuiltinError> {
    let target: PathBuf = match argv {
        [_] => dirs::home_dir().ok_or(BuiltinError::NoHomeDirectory)?,
        [_, path] => PathBuf::from(path),
        _ => return Err(BuiltinError::Arity(argv.len().saturating_sub(1))),
    };
    env::set_current_dir(&target)?;
    log::debug!("Working directory is now '{}'", target.display());
    Ok(BuiltinAction::Continue)
}

fn list_current_directory(
    argv: &[OsString],
    out: &mut dyn Write,
) -> Result<BuiltinAction, BuiltinError> {
    if argv.len() > 1 {
        return Err(BuiltinError::Arity(argv.len() - 1));
    }
    list_directory(Path::new("."), out)?;
    Ok(BuiltinAction::Continue)
}

/// Writes the non-hidden entry names of `dir`, one per line, sorted.
fn list_directory(dir: &Path, out: &mut dyn Write) -> Result<(), BuiltinError> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    names.retain(|name| !name.starts_with('.'));
    names.sort();

    for name in names {
        writeln!(out, "{}", name)?;
    }
    out.flush()?;
    Ok(())
}

fn malformed(token: &OsStr) -> BuiltinError {
    BuiltinError::MalformedInteger(token.to_string_lossy().into_owned())
}

fn parse_integer(token: &OsStr) -> Result<i32, BuiltinError> {
    token
        .to_str()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| malformed(token))
}

/// Parses `lkill PID` or `lkill -N PID`. `None` stands for signal 0, which
/// only checks that the target exists.
fn parse_kill_args(argv: &[OsString]) -> Result<(Pid, Option<Signal>), BuiltinError> {
    match argv {
        [_, pid] => Ok((Pid::from_raw(parse_integer(pid)?), Some(Signal::SIGTERM))),
        [_, flag, pid] => {
            let number = flag
                .as_bytes()
                .strip_prefix(b"-")
                .ok_or_else(|| malformed(flag))?;
            let number = parse_integer(OsStr::from_bytes(number))?;
            let signal = match number {
                0 => None,
                n => Some(Signal::try_from(n).map_err(|_| BuiltinError::InvalidSignal(n))?),
            };
            Ok((Pid::from_raw(parse_integer(pid)?), signal))
        }
        _ => Err(BuiltinError::Arity(argv.len().saturating_sub(1))),
    }
}

fn send_signal(argv: &[OsString], _out: &mut dyn Write) -> Result<BuiltinAction, BuiltinError> {
    let (pid, signal) = parse_kill_args(argv)?;
    kill(pid, signal).inspect_err(|e| {
        if *e == Errno::ESRCH {
            log::warn!("No process {} to signal.", pid);
        }
    })?;
    Ok(BuiltinAction::Continue)
}
