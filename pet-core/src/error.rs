//! Error types for pet-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with file path context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No config file present in any of the search locations.
    #[error("no config file found (searched: {searched:?})")]
    NotFound { searched: Vec<PathBuf> },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.pet.yaml`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A request named a backend the configuration does not define.
    #[error("unknown backend '{name}'")]
    UnknownBackend { name: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
