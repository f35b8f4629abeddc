//! # pipesh
//!
//! A small job-control shell. Input is framed into lines, parsed into
//! pipelines, and executed as processes wired together through pipes, with
//! foreground pipelines awaited and background completions reported before
//! the next prompt.

include!(concat!(env!("OUT_DIR"), "/messages.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod state;
pub mod system;
