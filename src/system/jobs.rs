// src/system/jobs.rs

//! Process bookkeeping shared between the main flow and the `SIGCHLD` handler.
//!
//! The registry is built from atomics only, so the handler can update it
//! without locks or allocation. The main flow never touches it without first
//! blocking `SIGCHLD` (see [`crate::state::lock_job_registry`]), which makes the
//! handler and the main flow mutually exclusive.

use crate::constants::{MAX_BACKGROUND, MAX_FOREGROUND};
use crate::state;
use nix::errno::Errno;
use nix::libc::c_int;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use thiserror::Error;

/// Marks an encoded status as "killed by signal".
const SIGNALED_FLAG: i32 = 0x100;
/// Marks an encoded status as "stopped by signal".
const STOPPED_FLAG: i32 = 0x200;

/// Errors raised while tracking processes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Foreground set is full ({capacity} processes); process {pid} will not be awaited.")]
    ForegroundFull { capacity: usize, pid: i32 },
}

/// How a child process ended, or that it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    /// Normal termination with this exit code.
    Exited(i32),
    /// Killed by this signal number.
    Signaled(i32),
    /// Stopped by this signal number; the process is still alive.
    Stopped(i32),
}

impl ExitReport {
    fn encode(self) -> i32 {
        match self {
            Self::Exited(code) => code & 0xff,
            Self::Signaled(signal) => SIGNALED_FLAG | (signal & 0xff),
            Self::Stopped(signal) => STOPPED_FLAG | (signal & 0xff),
        }
    }

    fn decode(raw: i32) -> Self {
        if raw & STOPPED_FLAG != 0 {
            Self::Stopped(raw & 0xff)
        } else if raw & SIGNALED_FLAG != 0 {
            Self::Signaled(raw & 0xff)
        } else {
            Self::Exited(raw)
        }
    }
}

/// A background state change waiting to be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub pid: i32,
    pub report: ExitReport,
}

/// Live foreground pids plus the queue of finished background processes.
///
/// Capacities are fixed at compile time. Every method is safe to call from
/// the signal handler; none allocates except [`JobRegistry::drain_background`],
/// which only the main flow calls.
#[derive(Debug)]
pub struct JobRegistry<const FG: usize = MAX_FOREGROUND, const BG: usize = MAX_BACKGROUND> {
    foreground: [AtomicI32; FG],
    foreground_len: AtomicUsize,
    background_pids: [AtomicI32; BG],
    background_statuses: [AtomicI32; BG],
    background_len: AtomicUsize,
}

impl<const FG: usize, const BG: usize> Default for JobRegistry<FG, BG> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FG: usize, const BG: usize> JobRegistry<FG, BG> {
    /// Creates an empty registry. Usable in `static` initializers.
    pub const fn new() -> Self {
        Self {
            foreground: [const { AtomicI32::new(0) }; FG],
            foreground_len: AtomicUsize::new(0),
            background_pids: [const { AtomicI32::new(0) }; BG],
            background_statuses: [const { AtomicI32::new(0) }; BG],
            background_len: AtomicUsize::new(0),
        }
    }

    // --- Foreground set ---

    /// Adds a freshly created foreground process to the set awaited by the
    /// current line.
    pub fn register_foreground(&self, pid: i32) -> Result<(), RegistryError> {
        let len = self.foreground_len.load(Ordering::Acquire);
        let slot = self
            .foreground
            .get(len)
            .ok_or(RegistryError::ForegroundFull { capacity: FG, pid })?;
        slot.store(pid, Ordering::Relaxed);
        self.foreground_len.store(len + 1, Ordering::Release);
        Ok(())
    }

    /// Removes `pid` from the foreground set. Returns whether it was a member.
    /// The last member takes the freed slot, so order is not preserved.
    pub fn release_foreground(&self, pid: i32) -> bool {
        let len = self.foreground_len.load(Ordering::Acquire);
        let members = self.foreground.get(..len).unwrap_or_default();
        let Some(position) = members.iter().position(|m| m.load(Ordering::Relaxed) == pid) else {
            return false;
        };
        let last = len - 1;
        if let (Some(freed), Some(tail)) = (members.get(position), members.get(last)) {
            freed.store(tail.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.foreground_len.store(last, Ordering::Release);
        true
    }

    /// Number of foreground processes still running.
    pub fn foreground_len(&self) -> usize {
        self.foreground_len.load(Ordering::Acquire)
    }

    /// True once every awaited foreground process has exited.
    pub fn is_foreground_empty(&self) -> bool {
        self.foreground_len() == 0
    }

    /// True while `pid` is tracked as a foreground process.
    pub fn is_foreground(&self, pid: i32) -> bool {
        let len = self.foreground_len();
        self.foreground
            .get(..len)
            .unwrap_or_default()
            .iter()
            .any(|m| m.load(Ordering::Relaxed) == pid)
    }

    // --- Background queue ---

    /// Records that `pid` ended. Foreground members leave the set; anything
    /// else is queued for the next report.
    pub fn record_exit(&self, pid: i32, report: ExitReport) {
        if !self.release_foreground(pid) {
            self.push_background(Completion { pid, report });
        }
    }

    /// Records that `pid` stopped. A foreground member leaves the set so the
    /// line stops waiting on it; anything else is queued for the next report.
    pub fn record_stop(&self, pid: i32, signal: i32) {
        if !self.release_foreground(pid) {
            self.push_background(Completion {
                pid,
                report: ExitReport::Stopped(signal),
            });
        }
    }

    /// Appends a completion, silently dropping it when the queue is full.
    fn push_background(&self, completion: Completion) {
        let len = self.background_len.load(Ordering::Acquire);
        if let (Some(pid_slot), Some(status_slot)) =
            (self.background_pids.get(len), self.background_statuses.get(len))
        {
            pid_slot.store(completion.pid, Ordering::Relaxed);
            status_slot.store(completion.report.encode(), Ordering::Relaxed);
            self.background_len.store(len + 1, Ordering::Release);
        }
    }

    /// Number of completions waiting to be reported.
    pub fn background_len(&self) -> usize {
        self.background_len.load(Ordering::Acquire)
    }

    /// Copies out every queued completion, in exit order, and empties the queue.
    pub fn drain_background(&self) -> Vec<Completion> {
        let len = self.background_len();
        let drained = self
            .background_pids
            .iter()
            .zip(self.background_statuses.iter())
            .take(len)
            .map(|(pid, status)| Completion {
                pid: pid.load(Ordering::Relaxed),
                report: ExitReport::decode(status.load(Ordering::Relaxed)),
            })
            .collect();
        self.background_len.store(0, Ordering::Release);
        drained
    }
}

// --- Completion handling ---

/// `SIGCHLD` handler: reaps every child that changed state without blocking
/// and records it in the process-wide registry.
///
/// Only async-signal-safe work happens here: `waitpid` and atomic stores.
/// A stopped foreground child leaves the set so the controller stops waiting
/// on it; its eventual exit is then queued like any untracked process. Any
/// other stopped child is queued as a stop report.
pub(crate) extern "C" fn on_child_state_change(_signal: c_int) {
    let saved_errno = Errno::last_raw();
    let registry = state::job_registry();
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;

    loop {
        match waitpid(Pid::from_raw(-1), Some(flags)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                registry.record_exit(pid.as_raw(), ExitReport::Exited(code));
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                registry.record_exit(pid.as_raw(), ExitReport::Signaled(signal as i32));
            }
            Ok(WaitStatus::Stopped(pid, signal)) => {
                registry.record_stop(pid.as_raw(), signal as i32);
            }
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => {}
        }
    }

    Errno::set_raw(saved_errno);
}

/// Suspends the main flow until every foreground process of the current
/// pipeline has exited.
///
/// Emptiness is only ever checked with `SIGCHLD` blocked, and the wait itself
/// unblocks and suspends in one atomic step, so a notification arriving
/// between the check and the wait cannot be lost.
pub fn await_foreground_drain() -> nix::Result<()> {
    let registry = state::lock_job_registry()?;
    log::debug!(
        "Waiting for {} foreground process(es).",
        registry.foreground_len()
    );
    while !registry.is_foreground_empty() {
        registry.wait_for_notification()?;
    }
    log::debug!("Foreground set drained.");
    Ok(())
}
