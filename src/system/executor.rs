// src/system/executor.rs

//! Turns parsed lines into running processes.
//!
//! Each pipeline is launched stage by stage. Between consecutive stages the
//! parent creates one pipe, hands its ends to the children, and closes every
//! end it does not need to carry forward, so it never holds more than three
//! pipe descriptors at once whatever the pipeline length. Foreground children
//! are registered with the job registry while `SIGCHLD` is blocked, then the
//! line waits for the foreground set to drain before the next pipeline starts.

use crate::{
    constants::{EXEC_FAILURE, OUTPUT_FILE_MODE, REDIRECT_FAILURE},
    core::builtins::{self, BuiltinOutcome, Dispatch},
    models::{Command, Line, Pipeline, RedirectMode, Redirection, Stream},
    state,
    system::jobs::{self, JobRegistry},
    system::signals,
};
use nix::errno::Errno;
use nix::unistd::{ForkResult, Pid, close, dup2, execvp, fork, pipe, setsid};
use std::ffi::{CString, OsString};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::process;
use thiserror::Error;

const STDIN_FD: RawFd = 0;
const STDOUT_FD: RawFd = 1;

/// Failures of the controller while running a line.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Pipeline {index} contains a command with no words.")]
    EmptyCommandInPipeline { index: usize },
    #[error("Could not create a pipe: {0}")]
    Pipe(#[source] nix::Error),
    #[error("Could not create a process for '{program}': {source}")]
    Fork {
        program: String,
        #[source]
        source: nix::Error,
    },
    #[error("Could not change the signal mask: {0}")]
    SignalMask(#[source] nix::Error),
}

impl ExecutionError {
    /// True for errors caused by the shape of the line rather than by the
    /// system; those are reported as syntax errors and the shell continues.
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Self::EmptyCommandInPipeline { .. })
    }
}

/// What the session should do after a line has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Terminate,
}

/// Whether a line's processes are awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Foreground,
    Background,
}

impl LaunchMode {
    /// The mode a whole line runs in.
    pub fn for_line(line: &Line) -> Self {
        if line.background {
            Self::Background
        } else {
            Self::Foreground
        }
    }
}

// --- Child setup policy ---

/// The inherited pipe descriptors of one stage: what becomes its stdin and
/// stdout, and the read end of the next pipe, which belongs to the following
/// stage and must be closed in this one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageWiring {
    pub stdin: Option<RawFd>,
    pub stdout: Option<RawFd>,
    pub foreign: Option<RawFd>,
}

/// Everything a child does to itself between `fork` and `exec`, as separate
/// steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSetup {
    /// Start a new session, detaching from terminal job-control signals.
    pub detach_session: bool,
    /// Put `SIGINT` back to its default action.
    pub restore_interrupt: bool,
    pub wiring: StageWiring,
}

impl ChildSetup {
    /// The setup policy for a stage launched in `mode`.
    pub fn new(mode: LaunchMode, wiring: StageWiring) -> Self {
        Self {
            detach_session: mode == LaunchMode::Background,
            restore_interrupt: true,
            wiring,
        }
    }

    fn apply_signals(&self) -> nix::Result<()> {
        if self.restore_interrupt {
            signals::restore_default_interrupt()?;
        }
        signals::clear_signal_mask()
    }

    fn apply_session(&self) -> nix::Result<()> {
        if self.detach_session {
            setsid()?;
        }
        Ok(())
    }

    fn apply_wiring(&self) -> nix::Result<()> {
        if let Some(fd) = self.wiring.foreign {
            close(fd)?;
        }
        if let Some(fd) = self.wiring.stdin {
            dup2(fd, STDIN_FD)?;
            close(fd)?;
        }
        if let Some(fd) = self.wiring.stdout {
            dup2(fd, STDOUT_FD)?;
            close(fd)?;
        }
        Ok(())
    }

    fn apply(&self) -> nix::Result<()> {
        self.apply_signals()?;
        self.apply_session()?;
        self.apply_wiring()
    }
}

// --- Redirections ---

/// A redirection target that could not be opened, reported by the child.
#[derive(Error, Debug)]
#[error("{}", describe_open_failure(.target, .source))]
pub struct RedirectionFailure {
    target: String,
    source: io::Error,
}

fn describe_open_failure(target: &str, source: &io::Error) -> String {
    match source.kind() {
        ErrorKind::NotFound => format!(t!("exec.error.not_found"), target = target),
        ErrorKind::PermissionDenied => format!(t!("exec.error.permission_denied"), target = target),
        _ => format!(t!("exec.error.redirect_failed"), target = target, cause = source),
    }
}

/// Opens a redirection target with the flags its mode calls for.
pub fn open_target(redirection: &Redirection) -> io::Result<File> {
    let mut options = OpenOptions::new();
    match redirection.mode {
        RedirectMode::Input => {
            options.read(true);
        }
        RedirectMode::Truncate => {
            options.write(true).create(true).truncate(true).mode(OUTPUT_FILE_MODE);
        }
        RedirectMode::Append => {
            options.append(true).create(true).mode(OUTPUT_FILE_MODE);
        }
    }
    options.open(&redirection.path)
}

/// Applies redirections left to right; a later one for the same stream
/// replaces an earlier one.
fn apply_redirections(redirections: &[Redirection]) -> Result<(), RedirectionFailure> {
    for redirection in redirections {
        let failure = |source: io::Error| RedirectionFailure {
            target: redirection.path.display().to_string(),
            source,
        };
        let file = open_target(redirection).map_err(failure)?;
        let stream_fd = match redirection.mode.stream() {
            Stream::Input => STDIN_FD,
            Stream::Output => STDOUT_FD,
        };
        dup2(file.as_raw_fd(), stream_fd).map_err(|e| failure(io::Error::from(e)))?;
        // `file` closes here; the stream keeps the duplicate.
    }
    Ok(())
}

// --- Child side ---

fn exec_program(argv: &[OsString]) -> Errno {
    let Ok(args) = argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
    else {
        return Errno::EINVAL;
    };
    let Some(program) = args.first() else {
        return Errno::EINVAL;
    };
    match execvp(program, &args) {
        Ok(never) => match never {},
        Err(errno) => errno,
    }
}

/// Runs in the forked child. Never returns: the process either becomes the
/// requested program or exits with a failure status.
fn run_child(command: &Command, setup: &ChildSetup) -> ! {
    let program = command.program().unwrap_or_default().to_string_lossy();

    if let Err(e) = setup.apply() {
        log::debug!("Child setup for '{}' failed: {}", program, e);
        eprintln!(t!("exec.error.exec_failed"), target = program);
        process::exit(EXEC_FAILURE);
    }

    if let Err(failure) = apply_redirections(&command.redirections) {
        eprintln!("{}", failure);
        process::exit(REDIRECT_FAILURE);
    }

    match exec_program(&command.argv) {
        Errno::ENOENT => eprintln!(t!("exec.error.not_found"), target = program),
        Errno::EACCES => eprintln!(t!("exec.error.permission_denied"), target = program),
        _ => eprintln!(t!("exec.error.exec_failed"), target = program),
    }
    process::exit(EXEC_FAILURE);
}

// --- Parent side ---

/// Adds a foreground child to the registry. A child that does not fit is
/// left running but will not be awaited; the user is told on `diagnostics`.
fn track_foreground<const FG: usize, const BG: usize>(
    registry: &JobRegistry<FG, BG>,
    pid: Pid,
    diagnostics: &mut dyn Write,
) {
    if let Err(e) = registry.register_foreground(pid.as_raw()) {
        log::warn!("{}", e);
        if let Err(e) = writeln!(diagnostics, t!("exec.error.foreground_full"), pid = pid) {
            log::debug!("Could not report an untracked child: {}", e);
        }
    }
}

/// Creates the child for one stage. For foreground stages the pid enters the
/// foreground set before the completion handler can observe its exit.
#[allow(unsafe_code)]
fn launch_stage(
    command: &Command,
    wiring: StageWiring,
    mode: LaunchMode,
) -> Result<Pid, ExecutionError> {
    let setup = ChildSetup::new(mode, wiring);
    let program = command.program().unwrap_or_default().to_string_lossy();

    // Anything still buffered would be written a second time by the child.
    if let Err(e) = io::stdout().flush() {
        log::warn!("Failed to flush standard output before fork: {}", e);
    }

    let registry = match mode {
        LaunchMode::Foreground => {
            Some(state::lock_job_registry().map_err(ExecutionError::SignalMask)?)
        }
        LaunchMode::Background => None,
    };

    // SAFETY: the controller is single-threaded, and the child only adjusts
    // its signal state and descriptors before it execs or exits.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => run_child(command, &setup),
        Ok(ForkResult::Parent { child }) => {
            log::debug!("Started '{}' as pid {} ({:?}).", program, child, mode);
            if let Some(registry) = &registry {
                track_foreground(&**registry, child, &mut io::stderr());
            }
            Ok(child)
        }
        Err(source) => Err(ExecutionError::Fork {
            program: program.into_owned(),
            source,
        }),
    }
}

/// Launches every stage of a pipeline, connecting each stage's stdout to the
/// next one's stdin.
fn launch_chain(commands: &[Command], mode: LaunchMode) -> Result<(), ExecutionError> {
    let mut upstream: Option<OwnedFd> = None;
    let mut stages = commands.iter().peekable();

    while let Some(command) = stages.next() {
        let (downstream, stdout) = if stages.peek().is_some() {
            let (read_end, write_end) = pipe().map_err(ExecutionError::Pipe)?;
            (Some(read_end), Some(write_end))
        } else {
            (None, None)
        };

        let wiring = StageWiring {
            stdin: upstream.as_ref().map(AsRawFd::as_raw_fd),
            stdout: stdout.as_ref().map(AsRawFd::as_raw_fd),
            foreign: downstream.as_ref().map(AsRawFd::as_raw_fd),
        };
        launch_stage(command, wiring, mode)?;

        // Only the read end feeding the next stage survives this iteration.
        drop(stdout);
        upstream = downstream;
    }
    Ok(())
}

fn run_pipeline(pipeline: &Pipeline, mode: LaunchMode) -> Result<LineOutcome, ExecutionError> {
    if pipeline.is_blank() {
        return Ok(LineOutcome::Continue);
    }

    if let [single] = pipeline.commands.as_slice() {
        if let Dispatch::InProcess(builtin) = builtins::resolve(&single.argv) {
            let outcome = builtin.invoke(&single.argv, &mut io::stdout().lock());
            return Ok(match outcome {
                BuiltinOutcome::Terminate => LineOutcome::Terminate,
                BuiltinOutcome::Success | BuiltinOutcome::Failure => LineOutcome::Continue,
            });
        }
    }

    launch_chain(&pipeline.commands, mode)?;

    if mode == LaunchMode::Foreground {
        jobs::await_foreground_drain().map_err(ExecutionError::SignalMask)?;
    }
    Ok(LineOutcome::Continue)
}

/// Checks the structure of every pipeline before anything in the line runs.
pub fn validate_line(line: &Line) -> Result<(), ExecutionError> {
    match line.pipelines.iter().position(Pipeline::has_empty_link) {
        Some(index) => Err(ExecutionError::EmptyCommandInPipeline { index }),
        None => Ok(()),
    }
}

/// Runs every pipeline of a line, left to right.
///
/// A malformed line runs nothing. In the foreground, each pipeline's
/// processes have all exited before the next pipeline starts; in the
/// background, nothing is awaited.
pub fn execute_line(line: &Line) -> Result<LineOutcome, ExecutionError> {
    validate_line(line)?;
    let mode = LaunchMode::for_line(line);

    for pipeline in &line.pipelines {
        if run_pipeline(pipeline, mode)? == LineOutcome::Terminate {
            return Ok(LineOutcome::Terminate);
        }
    }
    Ok(LineOutcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn command(words: &[&str]) -> Command {
        Command {
            argv: words.iter().map(|w| OsString::from(*w)).collect(),
            redirections: Vec::new(),
        }
    }

    fn redirection(path: PathBuf, mode: RedirectMode) -> Redirection {
        Redirection { path, mode }
    }

    #[test]
    fn test_empty_middle_command_rejects_whole_line() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("marker");
        let line = Line {
            pipelines: vec![
                Pipeline {
                    commands: vec![command(&["touch", marker.to_str().unwrap()])],
                },
                Pipeline {
                    commands: vec![command(&["echo", "a"]), command(&[]), command(&["cat"])],
                },
            ],
            background: false,
        };

        let result = execute_line(&line);

        assert!(matches!(
            result,
            Err(ExecutionError::EmptyCommandInPipeline { index: 1 })
        ));
        assert!(result.unwrap_err().is_syntax_error());
        assert!(!marker.exists(), "no pipeline of a malformed line may run");
    }

    #[test]
    fn test_blank_lines_are_valid_and_do_nothing() {
        let line = Line {
            pipelines: vec![Pipeline::default(), Pipeline { commands: vec![command(&[])] }],
            background: false,
        };
        assert!(validate_line(&line).is_ok());
        assert_eq!(execute_line(&line).unwrap(), LineOutcome::Continue);
    }

    #[test]
    fn test_child_setup_detaches_only_background_stages() {
        let wiring = StageWiring {
            stdin: Some(5),
            stdout: Some(8),
            foreign: Some(7),
        };

        let background = ChildSetup::new(LaunchMode::Background, wiring);
        assert!(background.detach_session);
        assert!(background.restore_interrupt);
        assert_eq!(background.wiring, wiring);

        let foreground = ChildSetup::new(LaunchMode::Foreground, StageWiring::default());
        assert!(!foreground.detach_session);
        assert!(foreground.restore_interrupt);
    }

    #[test]
    fn test_launch_mode_follows_line_flag() {
        let mut line = Line::default();
        assert_eq!(LaunchMode::for_line(&line), LaunchMode::Foreground);
        line.background = true;
        assert_eq!(LaunchMode::for_line(&line), LaunchMode::Background);
    }

    #[test]
    fn test_truncate_target_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old contents\n").unwrap();

        let mut file = open_target(&redirection(path.clone(), RedirectMode::Truncate)).unwrap();
        file.write_all(b"new\n").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_append_target_keeps_contents_and_creates_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");

        for chunk in ["one\n", "two\n"] {
            let mut file = open_target(&redirection(path.clone(), RedirectMode::Append)).unwrap();
            file.write_all(chunk.as_bytes()).unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_missing_input_target_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");

        let source = open_target(&redirection(path.clone(), RedirectMode::Input)).unwrap_err();
        let failure = RedirectionFailure {
            target: path.display().to_string(),
            source,
        };

        assert_eq!(
            failure.to_string(),
            format!("{}: no such file or directory", path.display())
        );
    }

    #[test]
    fn test_other_open_failures_carry_their_cause() {
        let source = io::Error::from(ErrorKind::PermissionDenied);
        let failure = RedirectionFailure {
            target: "locked".to_string(),
            source,
        };
        assert_eq!(failure.to_string(), "locked: permission denied");

        let failure = RedirectionFailure {
            target: "dir".to_string(),
            source: io::Error::from(ErrorKind::IsADirectory),
        };
        assert!(failure.to_string().starts_with("dir: "));
        assert!(std::error::Error::source(&failure).is_some());
    }

    #[test]
    fn test_full_foreground_set_is_reported_to_the_user() {
        let registry = JobRegistry::<1, 1>::new();
        let mut diagnostics: Vec<u8> = Vec::new();

        track_foreground(&registry, Pid::from_raw(41), &mut diagnostics);
        assert!(diagnostics.is_empty());

        track_foreground(&registry, Pid::from_raw(42), &mut diagnostics);
        let text = String::from_utf8(diagnostics).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("42"), "diagnostic should name the pid: {:?}", text);
        assert_eq!(registry.foreground_len(), 1);
    }
}
