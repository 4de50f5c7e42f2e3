//! Conversion from loaded configuration to component settings.

use std::path::PathBuf;
use std::time::Duration;

use tessera_config::{Config, ConfigError, ConfigResult};
use tessera_repository::{DigestAlgorithm, RepositoryConfig};
use tessera_runtime::RuntimeConfig;

/// Directory under the storage directory used for module data when
/// `runtime.data_dir` is unset.
pub const DEFAULT_DATA_SUBDIR: &str = "data";

/// Repository settings from `[repository]`.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if the storage directory is
/// missing or the digest algorithm is unknown.
pub fn repository_config(config: &Config) -> ConfigResult<RepositoryConfig> {
    let section = &config.repository;
    let storage_dir = storage_dir(config)?;
    let digest: DigestAlgorithm =
        section
            .digest_algorithm
            .parse()
            .map_err(|message| ConfigError::ValidationError {
                field: "repository.digest_algorithm".to_owned(),
                message,
            })?;

    Ok(RepositoryConfig::new(storage_dir)
        .with_name(section.name.clone())
        .with_catalog_file(section.catalog_file.clone())
        .with_digest_algorithm(digest))
}

/// Runtime settings from `[runtime]`.
///
/// Module data lives under `runtime.data_dir`, or under
/// `<storage_dir>/data` when only the storage directory is configured.
#[must_use]
pub fn runtime_config(config: &Config) -> RuntimeConfig {
    let section = &config.runtime;
    let mut runtime = RuntimeConfig::default()
        .with_name(section.name.clone())
        .with_lock_timeout(Duration::from_millis(section.lock_timeout_ms))
        .with_event_queue_warn_depth(section.event_queue_warn_depth);

    let data_dir = section
        .data_dir
        .as_deref()
        .map(PathBuf::from)
        .or_else(|| {
            config
                .repository
                .storage_path()
                .map(|dir| dir.join(DEFAULT_DATA_SUBDIR))
        });
    if let Some(dir) = data_dir {
        runtime = runtime.with_data_dir(dir);
    }
    runtime
}

fn storage_dir(config: &Config) -> ConfigResult<PathBuf> {
    config
        .repository
        .storage_path()
        .ok_or_else(|| ConfigError::ValidationError {
            field: "repository.storage_dir".to_owned(),
            message: "a storage directory is required".to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_config_from_sections() {
        let mut config = Config::for_storage_dir("/srv/tessera");
        config.repository.digest_algorithm = "BLAKE3".to_owned();
        config.repository.catalog_file = "catalog.json".to_owned();

        let repository = repository_config(&config).unwrap();
        assert_eq!(repository.storage_dir, PathBuf::from("/srv/tessera"));
        assert_eq!(repository.catalog_file, "catalog.json");
        assert_eq!(repository.digest_algorithm, DigestAlgorithm::Blake3);
    }

    #[test]
    fn test_repository_config_requires_storage_dir() {
        assert!(matches!(
            repository_config(&Config::default()),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_runtime_data_dir_defaults_under_storage() {
        let config = Config::for_storage_dir("/srv/tessera");
        let runtime = runtime_config(&config);
        assert_eq!(
            runtime.data_dir,
            Some(PathBuf::from("/srv/tessera").join(DEFAULT_DATA_SUBDIR))
        );
        assert_eq!(runtime.lock_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_runtime_explicit_values() {
        let mut config = Config::for_storage_dir("/srv/tessera");
        config.runtime.data_dir = Some("/var/modules".to_owned());
        config.runtime.lock_timeout_ms = 250;
        config.runtime.name = "edge".to_owned();

        let runtime = runtime_config(&config);
        assert_eq!(runtime.data_dir, Some(PathBuf::from("/var/modules")));
        assert_eq!(runtime.lock_timeout, Duration::from_millis(250));
        assert_eq!(runtime.name, "edge");
    }
}
