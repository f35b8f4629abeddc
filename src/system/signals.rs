// src/system/signals.rs

//! Signal dispositions of the controller and its children, and the
//! `SIGCHLD` blocking guard used for every main-flow access to shared state.

use crate::system::jobs;
use nix::libc;
use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, sigaction, sigprocmask,
};

fn child_signal_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set
}

/// Installs the controller's dispositions: the completion handler on
/// `SIGCHLD`, and `SIGINT` ignored so only children can be interrupted.
#[allow(unsafe_code)]
pub fn install_handlers() -> nix::Result<()> {
    let on_child = SigAction::new(
        SigHandler::Handler(jobs::on_child_state_change),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

    // SAFETY: the handler only calls `waitpid` and stores into atomics.
    unsafe {
        sigaction(Signal::SIGCHLD, &on_child)?;
        sigaction(Signal::SIGINT, &ignore)?;
    }
    log::debug!("Installed SIGCHLD handler; SIGINT ignored.");
    Ok(())
}

/// Child setup step: put `SIGINT` back to its default action so the program
/// about to be executed can be interrupted.
#[allow(unsafe_code)]
pub fn restore_default_interrupt() -> nix::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing the default disposition runs no user code.
    unsafe { sigaction(Signal::SIGINT, &default) }.map(|_| ())
}

/// Child setup step: unblock every signal. The mask survives `exec`, and a
/// child may be created while the controller holds `SIGCHLD` blocked.
pub fn clear_signal_mask() -> nix::Result<()> {
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
}

/// Keeps `SIGCHLD` blocked for as long as it lives; dropping it restores the
/// mask that was in effect before.
///
/// Guards nest: each one restores exactly the mask it replaced.
#[derive(Debug)]
pub struct ChildSignalBlock {
    previous: SigSet,
}

impl ChildSignalBlock {
    /// Blocks `SIGCHLD` delivery.
    pub fn engage() -> nix::Result<Self> {
        let mut previous = SigSet::empty();
        sigprocmask(
            SigmaskHow::SIG_BLOCK,
            Some(&child_signal_set()),
            Some(&mut previous),
        )?;
        Ok(Self { previous })
    }

    /// Atomically unblocks `SIGCHLD` and sleeps until a signal is handled,
    /// then returns with `SIGCHLD` blocked again.
    #[allow(unsafe_code)]
    pub fn suspend(&self) -> nix::Result<()> {
        let mut wake_mask = SigSet::thread_get_mask()?;
        wake_mask.remove(Signal::SIGCHLD);
        // SAFETY: `wake_mask` is a valid, initialized signal set. sigsuspend
        // always returns -1 with EINTR once a handler has run.
        unsafe {
            libc::sigsuspend(wake_mask.as_ref());
        }
        Ok(())
    }
}

impl Drop for ChildSignalBlock {
    fn drop(&mut self) {
        if let Err(e) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            log::warn!("Failed to restore the signal mask: {}", e);
        }
    }
}
