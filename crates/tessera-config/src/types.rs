//! Configuration types for the Tessera runtime.
//!
//! These types have no dependencies on other tessera crates; they are
//! converted into domain settings at the boundary. Every struct implements
//! [`Default`] so that a bare `[section]` header produces a working
//! configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persistent repository storage.
    pub repository: RepositorySection,
    /// Module runtime behaviour.
    pub runtime: RuntimeSection,
    /// Logging level, format and per-crate directives.
    pub logging: LoggingSection,
}

impl Config {
    /// Defaults with the repository stored under `storage_dir`.
    #[must_use]
    pub fn for_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.repository.storage_dir = Some(storage_dir.into().display().to_string());
        config
    }
}

/// Repository storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySection {
    /// Repository name recorded in the catalog.
    pub name: String,
    /// Root of the catalog and content blobs. Required.
    pub storage_dir: Option<String>,
    /// Catalog file name inside `storage_dir`.
    pub catalog_file: String,
    /// Content digest: `"sha256"`, `"sha512"` or `"blake3"`.
    pub digest_algorithm: String,
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            name: "repository".to_owned(),
            storage_dir: None,
            catalog_file: "repository.json".to_owned(),
            digest_algorithm: "sha256".to_owned(),
        }
    }
}

impl RepositorySection {
    /// The storage directory as a path, if set.
    #[must_use]
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage_dir.as_deref().map(PathBuf::from)
    }
}

/// Module runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Runtime name, used as the event source.
    pub name: String,
    /// Bound on acquiring a module's start/stop lock, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Root of per-module data areas. `None` uses `<storage_dir>/data`.
    pub data_dir: Option<String>,
    /// Asynchronous event backlog at which a warning is logged.
    pub event_queue_warn_depth: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            name: "tessera".to_owned(),
            lock_timeout_ms: 10_000,
            data_dir: None,
            event_queue_warn_depth: 1024,
        }
    }
}

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tessera_repository=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
