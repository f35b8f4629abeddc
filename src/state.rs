// src/state.rs

//! Process-wide state shared with the `SIGCHLD` handler.
//!
//! The handler reaches the registry directly through [`job_registry`]. The
//! main flow goes through [`lock_job_registry`], whose guard keeps `SIGCHLD`
//! blocked while it is alive, so the two sides never interleave.

use crate::system::jobs::JobRegistry;
use crate::system::signals::ChildSignalBlock;
use std::ops::Deref;

static JOB_REGISTRY: JobRegistry = JobRegistry::new();

/// Unguarded access, for the signal handler only.
pub(crate) fn job_registry() -> &'static JobRegistry {
    &JOB_REGISTRY
}

/// Exclusive access to the job registry from the main flow.
///
/// Derefs to the registry; dropping it lets pending notifications through.
#[derive(Debug)]
pub struct RegistryGuard {
    block: ChildSignalBlock,
}

impl RegistryGuard {
    /// Sleeps until the next notification has been handled. The registry may
    /// have changed when this returns; the guard is still held.
    pub fn wait_for_notification(&self) -> nix::Result<()> {
        self.block.suspend()
    }
}

impl Deref for RegistryGuard {
    type Target = JobRegistry;

    fn deref(&self) -> &Self::Target {
        &JOB_REGISTRY
    }
}

/// Blocks `SIGCHLD` and returns a guard over the registry.
pub fn lock_job_registry() -> nix::Result<RegistryGuard> {
    let block = ChildSignalBlock::engage()?;
    Ok(RegistryGuard { block })
}
