//! Common imports for working with the runtime.
//!
//! ```
//! use tessera_runtime::prelude::*;
//! ```

pub use crate::{
    ActivatorLoader, ActivatorRegistry, Module, ModuleActivator, ModuleContext, ModuleSpec,
    ModuleState, Runtime, RuntimeConfig, RuntimeError, RuntimeResult,
};
