//! # Config Loader
//!
//! Builds the session's [`ShellConfig`] from layers, lowest precedence first:
//! built-in defaults, then a `config.toml` file (the default one in the
//! pipesh config directory, or the one named with `--config`), then
//! command-line flags.
//!
//! A missing default file is normal and silently skipped. A file named
//! explicitly must exist.

use crate::{
    core::paths,
    models::{ConfigLayer, ShellConfig},
};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file '{0}' does not exist.")]
    MissingExplicit(String),
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("'max_line_length' must be at least 1.")]
    InvalidLineLength,
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// A config file to use instead of the default one.
    pub config_path: Option<PathBuf>,
    pub prompt: Option<String>,
    pub max_line_length: Option<usize>,
}

impl ConfigOverrides {
    fn as_layer(&self) -> ConfigLayer {
        ConfigLayer {
            prompt: self.prompt.clone(),
            max_line_length: self.max_line_length,
        }
    }
}

fn merge_layer(config: &mut ShellConfig, layer: ConfigLayer) {
    if let Some(prompt) = layer.prompt {
        config.prompt = prompt;
    }
    if let Some(max_line_length) = layer.max_line_length {
        config.max_line_length = max_line_length;
    }
}

/// Reads one layer from disk. `Ok(None)` means the file does not exist.
fn read_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
}

/// Resolves the configuration against an explicit default file location.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    default_file: Option<&Path>,
) -> Result<ShellConfig, ConfigError> {
    let mut config = ShellConfig::default();

    let file_layer = match (&overrides.config_path, default_file) {
        (Some(explicit), _) => Some(
            read_layer(explicit)?
                .ok_or_else(|| ConfigError::MissingExplicit(explicit.display().to_string()))?,
        ),
        (None, Some(default)) => read_layer(default)?,
        (None, None) => None,
    };
    if let Some(layer) = file_layer {
        log::debug!("Applying config file layer: {:?}", layer);
        merge_layer(&mut config, layer);
    }

    merge_layer(&mut config, overrides.as_layer());

    if config.max_line_length == 0 {
        return Err(ConfigError::InvalidLineLength);
    }
    log::debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

/// Resolves the configuration, looking for the default file in the pipesh
/// config directory.
pub fn load_config(overrides: &ConfigOverrides) -> Result<ShellConfig, ConfigError> {
    let default_file = match paths::get_config_file_path() {
        Ok(path) => Some(path),
        Err(e) => {
            log::debug!("No default config file: {}", e);
            None
        }
    };
    resolve_config(overrides, default_file.as_deref())
}
