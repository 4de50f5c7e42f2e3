//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Digest algorithm names accepted by `repository.digest_algorithm`.
pub const DIGEST_ALGORITHMS: &[&str] = &["sha256", "sha512", "blake3"];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Normalize a digest algorithm name: lowercase, dashes removed.
#[must_use]
pub fn normalize_digest_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "")
}

/// Check a merged configuration for values no component could use.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first bad field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    let repository = &config.repository;
    match repository.storage_dir.as_deref() {
        None => return Err(invalid("repository.storage_dir", "a storage directory is required")),
        Some(dir) if dir.trim().is_empty() => {
            return Err(invalid("repository.storage_dir", "must not be empty"));
        },
        Some(_) => {},
    }

    if repository.catalog_file.trim().is_empty() {
        return Err(invalid("repository.catalog_file", "must not be empty"));
    }
    if repository.catalog_file.contains(['/', '\\']) {
        return Err(invalid(
            "repository.catalog_file",
            "must be a file name, not a path",
        ));
    }

    let digest = normalize_digest_name(&repository.digest_algorithm);
    if !DIGEST_ALGORITHMS.contains(&digest.as_str()) {
        return Err(invalid(
            "repository.digest_algorithm",
            &format!(
                "unknown algorithm '{}', expected one of {}",
                repository.digest_algorithm,
                DIGEST_ALGORITHMS.join(", ")
            ),
        ));
    }

    if config.runtime.lock_timeout_ms == 0 {
        return Err(invalid("runtime.lock_timeout_ms", "must be greater than zero"));
    }
    if config.runtime.name.trim().is_empty() {
        return Err(invalid("runtime.name", "must not be empty"));
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(invalid(
            "logging.level",
            &format!("unknown level '{}'", config.logging.level),
        ));
    }
    let format = config.logging.format.to_ascii_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        return Err(invalid(
            "logging.format",
            &format!("unknown format '{}'", config.logging.format),
        ));
    }

    Ok(())
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.to_owned(),
    }
}
