//! Tessera Runtime - module lifecycle for the Tessera module runtime.
//!
//! This crate provides:
//! - `Runtime`, the table of installed modules and their event dispatcher
//! - `Module`, a resource installed into a runtime, with its lifecycle
//!   state machine
//! - The `ModuleActivator` and `ActivatorLoader` hooks
//! - `ModuleContext`, the handle an active module works through
//!
//! # Lifecycle
//!
//! ```text
//! install: INSTALLED -> RESOLVED
//! start:   RESOLVED|INSTALLED -> STARTING -> ACTIVE
//!          (start hook fails)  -> STOPPING -> INSTALLED
//! stop:    ACTIVE -> STOPPING -> INSTALLED
//! uninstall: stop, then UNINSTALLED
//! ```
//!
//! Each transition fires one event. Transitions of one module are serialized
//! by a start/stop lock whose acquisition is bounded by
//! `RuntimeConfig::lock_timeout`.
//!
//! # Example
//!
//! ```rust
//! use tessera_resource::{Resource, Version};
//! use tessera_runtime::prelude::*;
//!
//! # async fn example() -> RuntimeResult<()> {
//! let runtime = Runtime::new(RuntimeConfig::default());
//! let module = runtime
//!     .install_module(ModuleSpec::new(
//!         Resource::builder()
//!             .identity("alpha", Version::new(1, 0, 0))
//!             .build()
//!             .unwrap(),
//!     ))
//!     .await?;
//! module.start().await?;
//! assert_eq!(module.state(), ModuleState::Active);
//! runtime.shutdown().await;
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

mod activator;
mod config;
mod context;
mod error;
mod module;
mod runtime;
mod state;

pub use activator::{ActivatorFactory, ActivatorLoader, ActivatorRegistry, ModuleActivator};
pub use config::{DEFAULT_LOCK_TIMEOUT, RuntimeConfig};
pub use context::ModuleContext;
pub use error::{RuntimeError, RuntimeResult};
pub use module::{Module, ModuleSpec};
pub use runtime::Runtime;
pub use state::ModuleState;
