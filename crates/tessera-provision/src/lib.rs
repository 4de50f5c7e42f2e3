//! Tessera Provision - dependency resolution and installation.
//!
//! This crate provides:
//! - `RuntimeEnvironment`, the resources a running system already offers
//! - `Provisioner`, which resolves requirements against the environment and
//!   a repository and installs what is missing, dependencies first
//! - The `ResourceInstaller` and `ResourceHandle` host hooks, with
//!   `RuntimeResourceInstaller` installing into a `tessera_runtime::Runtime`
//! - Conversion from `tessera_config::Config` to repository and runtime
//!   settings
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tessera_provision::prelude::*;
//! use tessera_repository::PersistentRepository;
//! use tessera_resource::Requirement;
//! use tessera_runtime::Runtime;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = tessera_config::load(None, None)?.config;
//! let runtime = Runtime::new(runtime_config(&config));
//! let repository = Arc::new(PersistentRepository::open(repository_config(&config)?)?);
//! let environment = Arc::new(RuntimeEnvironment::new(&runtime));
//!
//! let provisioner = Provisioner::new(
//!     environment,
//!     repository,
//!     Arc::new(RuntimeResourceInstaller::new(runtime.clone())),
//! );
//! provisioner
//!     .provision_resources(&[Requirement::generic("service", "log")?])
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bridge;
mod environment;
mod error;
mod installer;
mod provisioner;

pub use bridge::{DEFAULT_DATA_SUBDIR, repository_config, runtime_config};
pub use environment::{EnvironmentSnapshot, RuntimeEnvironment};
pub use error::{ProvisionError, ProvisionResult};
pub use installer::{ModuleHandle, ResourceHandle, ResourceInstaller, RuntimeResourceInstaller};
pub use provisioner::{ProvisionPlan, Provisioner};
