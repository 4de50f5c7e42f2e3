//! Runtime error types.

use std::path::PathBuf;
use std::time::Duration;

use tessera_resource::ResourceIdentity;

use crate::state::ModuleState;

/// Errors from module lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The start/stop lock of a module was not acquired in time.
    #[error("timed out after {timeout:?} waiting for the start/stop lock of {module}")]
    LockTimeout {
        /// Module identity.
        module: ResourceIdentity,
        /// Configured acquisition timeout.
        timeout: Duration,
    },

    /// An activator could not be loaded, or its start or stop hook failed.
    #[error("activation of {module} failed: {source}")]
    ActivationFailure {
        /// Module identity.
        module: ResourceIdentity,
        /// What the activator or loader reported.
        #[source]
        source: anyhow::Error,
    },

    /// The operation is not allowed in the module's current state.
    #[error("cannot {operation} {module}: module is {state}")]
    InvalidState {
        /// Module identity.
        module: ResourceIdentity,
        /// Current state.
        state: ModuleState,
        /// Attempted operation.
        operation: &'static str,
    },

    /// A module with the same identity is already installed.
    #[error("a module with identity {0} is already installed")]
    DuplicateIdentity(ResourceIdentity),

    /// The module data area could not be prepared.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
