//! Unified configuration for the vouch approval broker.
//!
//! A single [`Config`] type covering the broker's general knobs, blocked
//! agents, rate limits, and integrations. Collaborators load it once at
//! startup and inject the relevant sections into the engine — there are no
//! process-wide singletons inside the core.
//!
//! # Configuration Precedence
//!
//! From lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. User (`~/.vouch/config.toml`)
//! 3. Project (`<project>/.vouch/config.toml`)
//!
//! Later layers merge table-by-table, so a project file can override a
//! single key without restating the whole section.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod loader;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    AgentsConfig, Config, GeneralConfig, IntegrationsConfig, RateLimitsConfig,
};

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any present config file is malformed.
    pub fn load(project_root: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(project_root, None)
    }

    /// Load configuration from a single file, no layering.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
