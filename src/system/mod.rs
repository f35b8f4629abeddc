//! # System Interaction Layer
//!
//! Everything that talks to the kernel about processes lives here, kept apart
//! from the line handling in [`crate::core`].
//!
//! ## Modules
//!
//! - **`executor`**: creates the processes of a line, wires pipes and
//!   redirections between them, and waits for foreground pipelines.
//! - **`jobs`**: the registry of foreground and finished background processes,
//!   and the `SIGCHLD` handler that keeps it current.
//! - **`signals`**: signal dispositions of the controller and its children,
//!   and the guard that keeps `SIGCHLD` blocked while shared state is touched.

pub mod executor;
pub mod jobs;
pub mod signals;
