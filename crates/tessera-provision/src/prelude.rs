//! Common imports for provisioning.
//!
//! ```
//! use tessera_provision::prelude::*;
//! ```

pub use crate::{
    ProvisionError, ProvisionPlan, ProvisionResult, Provisioner, ResourceHandle,
    ResourceInstaller, RuntimeEnvironment, RuntimeResourceInstaller, repository_config,
    runtime_config,
};
