// src/core/mod.rs

pub mod builtins;
pub mod config_loader;
pub mod framer;
pub mod parser;
pub mod paths;
pub mod reporter;
pub mod session;
