// src/core/reporter.rs

//! Reports background processes that finished or stopped since the last
//! prompt.

use crate::state;
use crate::system::jobs::{Completion, ExitReport};
use std::io::{self, Write};

/// Renders one background state change as a status line.
pub fn format_completion(completion: &Completion) -> String {
    match completion.report {
        ExitReport::Exited(code) => format!(t!("report.exited"), pid = completion.pid, code = code),
        ExitReport::Signaled(signal) => {
            format!(t!("report.signaled"), pid = completion.pid, signal = signal)
        }
        ExitReport::Stopped(signal) => {
            format!(t!("report.stopped"), pid = completion.pid, signal = signal)
        }
    }
}

/// Writes one line per completion, in the order given.
pub fn write_completions<W: Write>(out: &mut W, completions: &[Completion]) -> io::Result<()> {
    for completion in completions {
        writeln!(out, "{}", format_completion(completion))?;
    }
    out.flush()
}

/// Empties the background queue and reports its contents to `out`.
///
/// The queue is copied out while `SIGCHLD` is blocked; writing happens after
/// delivery is restored, so a slow terminal never delays reaping.
pub fn report_completions<W: Write>(out: &mut W) -> anyhow::Result<()> {
    let completions = {
        let registry = state::lock_job_registry()?;
        registry.drain_background()
    };
    if !completions.is_empty() {
        log::debug!("Reporting {} background completion(s).", completions.len());
    }
    write_completions(out, &completions)?;
    Ok(())
}
