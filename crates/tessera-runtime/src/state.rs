//! Module lifecycle states.

use std::fmt;

/// Lifecycle state of a module.
///
/// ```text
/// INSTALLED -> RESOLVED -> STARTING -> ACTIVE -> STOPPING -> INSTALLED
///        any state --uninstall--> UNINSTALLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Installed, not yet resolved, or stopped.
    Installed,
    /// Metadata resolved, ready to start.
    Resolved,
    /// The activator's start hook is running.
    Starting,
    /// Started.
    Active,
    /// The activator's stop hook is running.
    Stopping,
    /// Removed from the runtime. Terminal.
    Uninstalled,
}

impl ModuleState {
    /// Stable uppercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "INSTALLED",
            Self::Resolved => "RESOLVED",
            Self::Starting => "STARTING",
            Self::Active => "ACTIVE",
            Self::Stopping => "STOPPING",
            Self::Uninstalled => "UNINSTALLED",
        }
    }

    /// Whether the module has been uninstalled.
    #[must_use]
    pub fn is_uninstalled(self) -> bool {
        self == Self::Uninstalled
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
