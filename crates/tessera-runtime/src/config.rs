//! Runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use tessera_events::DEFAULT_QUEUE_WARN_DEPTH;

/// Default bound on acquiring a module's start/stop lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Runtime name, used as the event source.
    pub name: String,
    /// How long `start`, `stop` and `uninstall` wait for a module's
    /// start/stop lock. Hook execution time is not bounded.
    pub lock_timeout: Duration,
    /// Root of the per-module data areas, if modules may keep files.
    pub data_dir: Option<PathBuf>,
    /// Asynchronous event backlog at which the dispatcher warns.
    pub event_queue_warn_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "tessera".into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            data_dir: None,
            event_queue_warn_depth: DEFAULT_QUEUE_WARN_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Set the runtime name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the start/stop lock timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set the module data root.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Set the event backlog warning depth.
    #[must_use]
    pub fn with_event_queue_warn_depth(mut self, depth: usize) -> Self {
        self.event_queue_warn_depth = depth;
        self
    }
}
