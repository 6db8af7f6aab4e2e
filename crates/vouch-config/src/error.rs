//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed as TOML.
    #[error("parsing {path}: {source}")]
    Parse {
        /// The file that failed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The merged configuration did not deserialize into [`crate::Config`].
    #[error("invalid configuration: {0}")]
    Invalid(toml::de::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
