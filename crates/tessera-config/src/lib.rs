//! Tessera Config - layered configuration for the module runtime.
//!
//! Settings are resolved in this order, later layers winning:
//!
//! 1. Embedded defaults
//! 2. `~/.tessera/config.toml`
//! 3. An explicit config file
//!
//! `TESSERA_*` environment variables then fill any field no file set.
//! The result is validated before it is returned.
//!
//! This crate does not depend on any other tessera crate; callers convert
//! the sections into their own settings types.
//!
//! # Example
//!
//! ```no_run
//! let resolved = tessera_config::load(None, None)?;
//! println!("{:?}", resolved.config.repository.storage_dir);
//! # Ok::<(), tessera_config::ConfigError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod env;
mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{FileFields, ResolvedConfig, home_directory, load, load_file};
pub use types::{Config, LoggingSection, RepositorySection, RuntimeSection};
pub use validate::{DIGEST_ALGORITHMS, normalize_digest_name, validate};

impl Config {
    /// Load with the standard layering. See [`load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any layer is malformed or the result is
    /// invalid.
    pub fn load(
        explicit: Option<&std::path::Path>,
        tessera_home_override: Option<&std::path::Path>,
    ) -> ConfigResult<ResolvedConfig> {
        load(explicit, tessera_home_override)
    }
}
