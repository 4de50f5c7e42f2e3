//! Module lifecycle event types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_resource::{Resource, ResourceIdentity};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that fired the event, usually the runtime name.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Numeric module identity, unique for the lifetime of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleEventKind {
    /// Module was installed.
    Installed,
    /// Module metadata was resolved.
    Resolved,
    /// Module is starting.
    Starting,
    /// Module started and is active.
    Started,
    /// Module is stopping.
    Stopping,
    /// Module stopped and is back to installed.
    Stopped,
    /// Module was uninstalled.
    Uninstalled,
}

impl ModuleEventKind {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Resolved => "resolved",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Uninstalled => "uninstalled",
        }
    }
}

impl fmt::Display for ModuleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle transition of one module.
#[derive(Debug, Clone)]
pub struct ModuleEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// What happened.
    pub kind: ModuleEventKind,
    /// The module it happened to.
    pub module_id: ModuleId,
    /// The module's resource.
    pub resource: Arc<Resource>,
}

impl ModuleEvent {
    /// Create an event.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        kind: ModuleEventKind,
        module_id: ModuleId,
        resource: Arc<Resource>,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(source),
            kind,
            module_id,
            resource,
        }
    }

    /// Identity of the module's resource.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        self.resource.identity()
    }
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModuleEvent[{},module={},{}]",
            self.kind,
            self.module_id,
            self.identity()
        )
    }
}
