//! Config file discovery and layered loading.
//!
//! Implements the `load()` algorithm:
//! 1. Parse `defaults.toml` into the base tree
//! 2. Merge `~/.tessera/config.toml` (user)
//! 3. Merge the explicit config file, if one was given
//! 4. Apply `TESSERA_*` env var fallbacks for fields no file set
//! 5. Deserialize the merged tree into [`Config`]
//! 6. Validate

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Dotted field paths that some config file set explicitly.
pub type FileFields = BTreeSet<String>;

/// A validated configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Config files that were found and merged, lowest precedence first.
    pub loaded_files: Vec<String>,
    /// Fields whose value came from a `TESSERA_*` environment variable.
    pub env_fields: Vec<String>,
}

/// Load the configuration with layered file precedence.
///
/// `explicit` is a config file named by the caller; it must exist.
/// `tessera_home_override` replaces `~/.tessera` for user config discovery.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or malformed,
/// or if the merged configuration fails validation.
pub fn load(
    explicit: Option<&Path>,
    tessera_home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let user_dir = match tessera_home_override {
        Some(dir) => dir.to_path_buf(),
        None => home_directory()?.join(".tessera"),
    };
    load_with_env(explicit, &user_dir, &collect_env_vars())
}

pub(crate) fn load_with_env(
    explicit: Option<&Path>,
    user_dir: &Path,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged = defaults()?;
    let mut file_fields = FileFields::new();
    let mut loaded_files = Vec::new();

    let user_path = user_dir.join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge(&mut merged, &overlay, "", &mut file_fields);
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "Loaded user config");
    }

    if let Some(path) = explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
        })?;
        deep_merge(&mut merged, &overlay, "", &mut file_fields);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "Loaded config file");
    }

    let env_fields = apply_env_fallbacks(&mut merged, &file_fields, env_vars)?;
    if !env_fields.is_empty() {
        debug!(count = env_fields.len(), "Applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
        env_fields,
    })
}

/// Load a config from a specific file path, merged over the defaults only.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or
/// validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
    })?;
    let mut merged = defaults()?;
    deep_merge(&mut merged, &overlay, "", &mut FileFields::new());

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

fn defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

/// Read and parse a TOML file. A missing file is `Ok(None)`.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                metadata.len()
            ),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    let value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Merge `overlay` into `base`. Tables merge recursively; anything else in
/// the overlay replaces the base value. Every leaf the overlay sets is
/// recorded in `fields`.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value, prefix: &str, fields: &mut FileFields) {
    let Some(overlay_table) = overlay.as_table() else {
        *base = overlay.clone();
        fields.insert(prefix.to_owned());
        return;
    };
    let Some(base_table) = base.as_table_mut() else {
        *base = overlay.clone();
        fields.insert(prefix.to_owned());
        return;
    };

    for (key, value) in overlay_table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let both_tables =
            value.is_table() && base_table.get(key).is_some_and(toml::Value::is_table);
        if both_tables && let Some(existing) = base_table.get_mut(key) {
            deep_merge(existing, value, &path, fields);
        } else {
            base_table.insert(key.clone(), value.clone());
            fields.insert(path);
        }
    }
}

/// The current user's home directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if it cannot be determined.
pub fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
