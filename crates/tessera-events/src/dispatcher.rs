//! Two-tier event dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::event::ModuleEvent;
use crate::listener::{ListenerId, ListenerRegistry, ListenerTier, ModuleListener};

/// Default backlog at which the dispatcher starts warning.
pub const DEFAULT_QUEUE_WARN_DEPTH: usize = 1024;

enum Delivery {
    Event(ModuleEvent),
    Flush(oneshot::Sender<()>),
}

/// Delivers module events to listeners.
///
/// Synchronous listeners are notified on the firing task before
/// [`fire`](Self::fire) returns. Every event is then queued for a single
/// delivery worker which notifies asynchronous listeners in firing order, so
/// events of one module always arrive in the order they were fired.
#[derive(Debug)]
pub struct EventDispatcher {
    registry: Arc<ListenerRegistry>,
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    warn_depth: usize,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(event) => write!(f, "Delivery::Event({event})"),
            Self::Flush(_) => f.write_str("Delivery::Flush"),
        }
    }
}

impl EventDispatcher {
    /// Create a dispatcher with the default warning depth.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the delivery worker is
    /// spawned immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_warn_depth(DEFAULT_QUEUE_WARN_DEPTH)
    }

    /// Create a dispatcher that warns once the asynchronous backlog exceeds
    /// `warn_depth` events.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn with_warn_depth(warn_depth: usize) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(deliver(
            receiver,
            Arc::clone(&registry),
            Arc::clone(&pending),
        ));

        Self {
            registry,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            pending,
            warn_depth,
        }
    }

    /// Register a listener in `tier`.
    pub fn add_listener(&self, listener: Arc<dyn ModuleListener>, tier: ListenerTier) -> ListenerId {
        self.registry.register(listener, tier)
    }

    /// Unregister a listener. Returns `true` if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.registry.unregister(id)
    }

    /// The listener registry.
    #[must_use]
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Number of events queued but not yet delivered to asynchronous
    /// listeners.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Fire an event.
    ///
    /// Synchronous listeners have been notified when this returns;
    /// asynchronous listeners are notified later by the delivery worker.
    /// After [`shutdown`](Self::shutdown) only synchronous listeners are
    /// notified.
    pub fn fire(&self, event: ModuleEvent) {
        trace!(event_kind = %event.kind, module_id = %event.module_id, "Firing event");

        self.registry.notify(ListenerTier::Synchronous, &event);

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            debug!(event_kind = %event.kind, "Dispatcher shut down, asynchronous delivery skipped");
            return;
        };

        let depth = self.pending.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if depth > self.warn_depth {
            warn!(depth, warn_depth = self.warn_depth, "Event delivery backlog is growing");
        }
        if sender.send(Delivery::Event(event)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Delivery worker is gone, event dropped");
        }
    }

    /// Wait until every event fired before this call has been delivered to
    /// asynchronous listeners.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(sender) = sender.as_ref() else {
                return;
            };
            if sender.send(Delivery::Flush(done)).is_err() {
                return;
            }
        }
        let _ = wait.await;
    }

    /// Drain the queue and stop the delivery worker.
    ///
    /// Idempotent. Events fired afterwards reach synchronous listeners only.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Delivery worker ended abnormally");
            }
            debug!("Event dispatcher shut down");
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
    registry: Arc<ListenerRegistry>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(delivery) = receiver.recv().await {
        match delivery {
            Delivery::Event(event) => {
                registry.notify(ListenerTier::Asynchronous, &event);
                pending.fetch_sub(1, Ordering::SeqCst);
            },
            Delivery::Flush(done) => {
                let _ = done.send(());
            },
        }
    }
}
