//! Module context handed to activators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tessera_events::{ListenerId, ListenerTier, ModuleId, ModuleListener};
use tessera_resource::ResourceIdentity;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{Runtime, RuntimeShared};
use crate::state::ModuleState;

/// The view of the runtime a module gets while it is active.
///
/// A context is created when a module starts and destroyed when it stops.
/// Listeners registered through the context are removed on destruction.
#[derive(Clone)]
pub struct ModuleContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    module_id: ModuleId,
    identity: ResourceIdentity,
    data_dir: Option<PathBuf>,
    valid: AtomicBool,
    listeners: Mutex<Vec<ListenerId>>,
    runtime: Weak<RuntimeShared>,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module_id", &self.inner.module_id)
            .field("identity", &self.inner.identity)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl ModuleContext {
    pub(crate) fn new(
        module_id: ModuleId,
        identity: ResourceIdentity,
        data_root: Option<&Path>,
        runtime: Weak<RuntimeShared>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                module_id,
                data_dir: data_root.map(|root| root.join(format!("module-{}", module_id.0))),
                identity,
                valid: AtomicBool::new(true),
                listeners: Mutex::new(Vec::new()),
                runtime,
            }),
        }
    }

    /// Id of the owning module.
    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.inner.module_id
    }

    /// Identity of the owning module.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.inner.identity
    }

    /// Whether the owning module is still active with this context.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    /// The module's private data directory, if the runtime has a data root.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.inner.data_dir.as_deref()
    }

    /// Path of `name` inside the module's data directory, creating the
    /// directory on first use. `None` if the runtime has no data root.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidState`] if the context was destroyed,
    /// or [`RuntimeError::Io`] if the directory cannot be created.
    pub fn data_file(&self, name: &str) -> RuntimeResult<Option<PathBuf>> {
        self.ensure_valid("access the data area of")?;
        let Some(dir) = self.data_dir() else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir).map_err(|source| RuntimeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Some(dir.join(name)))
    }

    /// The runtime the module lives in, while it exists.
    #[must_use]
    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_shared)
    }

    /// Register a listener for the lifetime of this context.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidState`] if the context was destroyed or
    /// the runtime is gone.
    pub fn add_module_listener(
        &self,
        listener: Arc<dyn ModuleListener>,
        tier: ListenerTier,
    ) -> RuntimeResult<ListenerId> {
        self.ensure_valid("register a listener for")?;
        let runtime = self.runtime().ok_or_else(|| self.invalid("register a listener for"))?;
        let id = runtime.add_module_listener(listener, tier);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        Ok(id)
    }

    /// Remove a listener registered through this context.
    pub fn remove_module_listener(&self, id: ListenerId) -> bool {
        let owned = {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let before = listeners.len();
            listeners.retain(|l| *l != id);
            listeners.len() != before
        };
        owned
            && self
                .runtime()
                .is_some_and(|runtime| runtime.remove_module_listener(id))
    }

    /// Invalidate the context and drop its listeners.
    pub(crate) fn destroy(&self) {
        self.inner.valid.store(false, Ordering::SeqCst);
        let listeners = std::mem::take(
            &mut *self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if let Some(runtime) = self.runtime() {
            for id in &listeners {
                runtime.remove_module_listener(*id);
            }
        }
        debug!(
            module_id = %self.inner.module_id,
            listeners = listeners.len(),
            "Module context destroyed"
        );
    }

    fn ensure_valid(&self, operation: &'static str) -> RuntimeResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> RuntimeError {
        RuntimeError::InvalidState {
            module: self.inner.identity.clone(),
            state: ModuleState::Installed,
            operation,
        }
    }
}
