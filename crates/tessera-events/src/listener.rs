//! Module listener trait and registry.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::ModuleEvent;

/// Filter function type for module listeners.
pub type EventFilter = Box<dyn Fn(&ModuleEvent) -> bool + Send + Sync>;

/// Receives module lifecycle events.
///
/// Synchronous listeners run on the firing task before the lifecycle call
/// continues, so they must return quickly. Asynchronous listeners run on the
/// dispatcher's delivery worker.
pub trait ModuleListener: Send + Sync {
    /// Called for every accepted event.
    fn module_changed(&self, event: &ModuleEvent);

    /// Optional filter. Default implementation accepts all events.
    fn accepts(&self, event: &ModuleEvent) -> bool {
        let _ = event;
        true
    }

    /// Optional name for debugging.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Delivery tier chosen when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTier {
    /// Invoked on the firing task before `fire` returns.
    Synchronous,
    /// Invoked in order by the delivery worker.
    Asynchronous,
}

/// Registration handle for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Registration {
    id: ListenerId,
    tier: ListenerTier,
    listener: Arc<dyn ModuleListener>,
}

/// Registered listeners of both tiers, kept in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Registration>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener in `tier`.
    pub fn register(&self, listener: Arc<dyn ModuleListener>, tier: ListenerTier) -> ListenerId {
        let id = ListenerId::new();
        let name = listener.name().to_string();

        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration { id, tier, listener });

        debug!(listener_name = %name, tier = ?tier, "Listener registered");
        id
    }

    /// Unregister a listener. Returns `true` if it was registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        let removed = listeners.len() != before;

        if removed {
            debug!(listener_id = ?id, "Listener unregistered");
        }
        removed
    }

    /// Notify every listener of `tier` that accepts `event`.
    ///
    /// Listener panics are caught and logged.
    pub fn notify(&self, tier: ListenerTier, event: &ModuleEvent) {
        // Snapshot so listeners may (un)register from inside a callback.
        let targets: Vec<(ListenerId, Arc<dyn ModuleListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.tier == tier)
            .map(|r| (r.id, Arc::clone(&r.listener)))
            .collect();

        for (id, listener) in targets {
            if !listener.accepts(event) {
                continue;
            }
            trace!(
                listener_name = %listener.name(),
                event_kind = %event.kind,
                module_id = %event.module_id,
                "Notifying listener"
            );

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.module_changed(event);
            }));

            if let Err(e) = result {
                warn!(
                    listener_id = ?id,
                    listener_name = %listener.name(),
                    error = ?e,
                    "Listener panicked"
                );
            }
        }
    }

    /// Number of listeners in `tier`.
    #[must_use]
    pub fn count(&self, tier: ListenerTier) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.tier == tier)
            .count()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("All listeners cleared");
    }
}

/// A closure-backed listener.
pub struct FnListener<F>
where
    F: Fn(&ModuleEvent) + Send + Sync,
{
    name: String,
    filter: Option<EventFilter>,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&ModuleEvent) + Send + Sync,
{
    /// Create a new closure listener.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            filter: None,
            handler,
        }
    }

    /// Add a filter to this listener.
    #[must_use]
    pub fn with_filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ModuleEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }
}

impl<F> ModuleListener for FnListener<F>
where
    F: Fn(&ModuleEvent) + Send + Sync,
{
    fn module_changed(&self, event: &ModuleEvent) {
        (self.handler)(event);
    }

    fn accepts(&self, event: &ModuleEvent) -> bool {
        match &self.filter {
            Some(f) => f(event),
            None => true,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
