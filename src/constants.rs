// src/constants.rs

//! Fixed limits, exit codes and well-known names.

/// The name of the directory holding pipesh configuration (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "pipesh";

/// The name of the configuration file inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILENAME: &str = "config.toml";

/// Prompt shown before each read when the session is interactive.
pub const DEFAULT_PROMPT: &str = "$ ";

/// Longest accepted line, in bytes, not counting the terminator.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2048;

/// How many foreground processes can be awaited at once.
pub const MAX_FOREGROUND: usize = 1000;

/// How many finished background processes are kept until the next report.
pub const MAX_BACKGROUND: usize = 1000;

/// Exit status of a child whose program could not be started.
pub const EXEC_FAILURE: i32 = 127;

/// Exit status of a child whose redirections could not be applied.
pub const REDIRECT_FAILURE: i32 = 1;

/// Permission bits for files created by output redirections.
pub const OUTPUT_FILE_MODE: u32 = 0o644;
