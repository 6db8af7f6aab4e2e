//! Configuration file discovery, loading, and layered merging.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Directory name holding per-project broker state and config.
pub const STATE_DIR: &str = ".vouch";

/// File name of the configuration file inside a state directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Load configuration with the full precedence chain:
/// defaults → user (`~/.vouch/config.toml`) → project
/// (`<project>/.vouch/config.toml`). Missing files are skipped; present
/// files must parse.
///
/// `home_override` replaces the user config directory (tests).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any present file is unreadable or
/// malformed, or if the merged document fails to deserialize.
pub fn load(project_root: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<Config> {
    let mut merged = toml::Table::new();

    if let Some(user_path) = user_config_path(home_override) {
        if user_path.exists() {
            merge_into(&mut merged, read_table(&user_path)?);
        }
    }

    if let Some(project) = project_root {
        let project_path = project.join(STATE_DIR).join(CONFIG_FILE);
        if project_path.exists() {
            merge_into(&mut merged, read_table(&project_path)?);
        }
    }

    let mut config: Config = merged.try_into().map_err(ConfigError::Invalid)?;
    normalize(&mut config);
    Ok(config)
}

/// Load a single file with no layering.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is unreadable or malformed.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let table = read_table(path)?;
    let mut config: Config = table.try_into().map_err(ConfigError::Invalid)?;
    normalize(&mut config);
    Ok(config)
}

fn user_config_path(home_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(home) = home_override {
        return Some(home.join(STATE_DIR).join(CONFIG_FILE));
    }
    let dirs = directories::BaseDirs::new()?;
    Some(dirs.home_dir().join(STATE_DIR).join(CONFIG_FILE))
}

fn read_table(path: &Path) -> ConfigResult<toml::Table> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    text.parse::<toml::Table>().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Recursive table merge: scalar and array values in `overlay` replace
/// those in `base`; nested tables merge key-by-key.
fn merge_into(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Fix up values the broker tolerates rather than rejects.
fn normalize(config: &mut Config) {
    match config.rate_limits.rate_limit_action.as_str() {
        "reject" | "queue" | "warn" => {}
        _ => config.rate_limits.rate_limit_action = "reject".to_string(),
    }
}
