//! Modules and their lifecycle state machine.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use tessera_events::{ModuleEvent, ModuleEventKind, ModuleId};
use tessera_resource::namespace::identity;
use tessera_resource::{Resource, ResourceIdentity};
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, info, warn};

use crate::activator::{ActivatorLoader, ModuleActivator};
use crate::context::ModuleContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{Runtime, RuntimeShared};
use crate::state::ModuleState;

/// What to install: a resource plus how to find its activator.
#[derive(Clone)]
pub struct ModuleSpec {
    resource: Arc<Resource>,
    activator_name: Option<String>,
    loader: Option<Arc<dyn ActivatorLoader>>,
}

impl std::fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("resource", &self.resource.identity())
            .field("activator_name", &self.activator_name)
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

impl ModuleSpec {
    /// Install `resource` with the activator named by its identity
    /// capability, if any.
    #[must_use]
    pub fn new(resource: impl Into<Arc<Resource>>) -> Self {
        Self {
            resource: resource.into(),
            activator_name: None,
            loader: None,
        }
    }

    /// Override the activator name.
    #[must_use]
    pub fn with_activator(mut self, name: impl Into<String>) -> Self {
        self.activator_name = Some(name.into());
        self
    }

    /// Use `loader` instead of the runtime's default loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ActivatorLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// The resource to install.
    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }
}

/// A resource installed into a runtime.
///
/// `Module` is a cheap handle; clones refer to the same module.
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    id: ModuleId,
    resource: Arc<Resource>,
    activator_name: Option<String>,
    loader: Option<Arc<dyn ActivatorLoader>>,
    lock_timeout: Duration,
    data_root: Option<PathBuf>,
    state: RwLock<ModuleState>,
    transition: Mutex<()>,
    activator: OnceCell<Arc<dyn ModuleActivator>>,
    context: RwLock<Option<ModuleContext>>,
    runtime: Weak<RuntimeShared>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.inner.id)
            .field("identity", self.identity())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Module[{},{}]", self.inner.id, self.identity())
    }
}

impl Module {
    pub(crate) fn new(
        id: ModuleId,
        spec: ModuleSpec,
        default_loader: Option<Arc<dyn ActivatorLoader>>,
        lock_timeout: Duration,
        data_root: Option<PathBuf>,
        runtime: Weak<RuntimeShared>,
    ) -> Self {
        let activator_name = spec.activator_name.or_else(|| {
            spec.resource
                .identity_attribute(identity::ACTIVATOR)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        Self {
            inner: Arc::new(ModuleInner {
                id,
                resource: spec.resource,
                activator_name,
                loader: spec.loader.or(default_loader),
                lock_timeout,
                data_root,
                state: RwLock::new(ModuleState::Installed),
                transition: Mutex::new(()),
                activator: OnceCell::new(),
                context: RwLock::new(None),
                runtime,
            }),
        }
    }

    /// Module id.
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.inner.id
    }

    /// The installed resource.
    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.inner.resource
    }

    /// Identity of the installed resource.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        self.inner.resource.identity()
    }

    /// Current state. Read without the start/stop lock, so it may already be
    /// stale when a transition is in flight.
    #[must_use]
    pub fn state(&self) -> ModuleState {
        *self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Activator name, from the install spec or the identity capability's
    /// `module.activator` attribute.
    #[must_use]
    pub fn activator_name(&self) -> Option<&str> {
        self.inner.activator_name.as_deref()
    }

    /// The context of the active module.
    #[must_use]
    pub fn context(&self) -> Option<ModuleContext> {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The runtime this module was installed into, while it exists.
    #[must_use]
    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_shared)
    }

    /// Start the module.
    ///
    /// Returns immediately if the module is already `ACTIVE`. Otherwise the
    /// module passes through `STARTING`, a fresh [`ModuleContext`] is
    /// created, the activator is loaded on first use and its start hook
    /// runs. If that fails the module is driven through `STOPPING` back to
    /// `INSTALLED`, the context is destroyed and the cause is returned.
    ///
    /// The configured lock timeout bounds only the wait for the start/stop
    /// lock, not the hooks. A start hook may run far longer than the timeout
    /// and holds the lock while it does; concurrent transitions of the same
    /// module report [`RuntimeError::LockTimeout`] meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidState`] for an uninstalled module,
    /// [`RuntimeError::LockTimeout`] if the lock is busy, and
    /// [`RuntimeError::ActivationFailure`] if the activator cannot be loaded
    /// or its start hook fails.
    pub async fn start(&self) -> RuntimeResult<()> {
        self.ensure_installed("start")?;
        let _guard = self.lock_transition().await?;

        match self.state() {
            ModuleState::Uninstalled => return Err(self.invalid_state("start")),
            ModuleState::Active => return Ok(()),
            _ => {},
        }

        self.set_state(ModuleState::Starting);
        self.fire(ModuleEventKind::Starting);

        let context = ModuleContext::new(
            self.inner.id,
            self.identity().clone(),
            self.inner.data_root.as_deref(),
            self.inner.runtime.clone(),
        );
        *self
            .inner
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(context.clone());

        match self.activate(&context).await {
            Ok(()) if self.set_state(ModuleState::Active) => {
                self.fire(ModuleEventKind::Started);
                info!(module_id = %self.inner.id, identity = %self.identity(), "Module started");
                Ok(())
            },
            Ok(()) => {
                // Uninstalled while the start hook ran; undo what it started.
                // The context was already destroyed by the uninstall.
                if let Some(activator) = self.inner.activator.get()
                    && let Err(e) = activator.stop(&context).await
                {
                    warn!(
                        module_id = %self.inner.id,
                        identity = %self.identity(),
                        error = %e,
                        "Stop hook failed after concurrent uninstall"
                    );
                }
                Err(self.invalid_state("start"))
            },
            Err(source) => {
                if self.set_state(ModuleState::Stopping) {
                    self.fire(ModuleEventKind::Stopping);
                }
                if self.set_state(ModuleState::Installed) {
                    self.fire(ModuleEventKind::Stopped);
                }
                self.destroy_context();
                warn!(
                    module_id = %self.inner.id,
                    identity = %self.identity(),
                    error = %source,
                    "Module failed to start"
                );
                Err(RuntimeError::ActivationFailure {
                    module: self.identity().clone(),
                    source,
                })
            },
        }
    }

    /// Stop the module.
    ///
    /// A module that is not `ACTIVE` is left alone. Otherwise the module
    /// passes through `STOPPING`, the activator's stop hook runs, and the
    /// module returns to `INSTALLED` with its context destroyed. A failing
    /// stop hook is reported only after that cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidState`] for an uninstalled module,
    /// [`RuntimeError::LockTimeout`] if the lock is busy, and
    /// [`RuntimeError::ActivationFailure`] if the stop hook failed.
    pub async fn stop(&self) -> RuntimeResult<()> {
        self.ensure_installed("stop")?;
        let _guard = self.lock_transition().await?;

        match self.state() {
            ModuleState::Uninstalled => return Err(self.invalid_state("stop")),
            ModuleState::Active => {},
            _ => return Ok(()),
        }

        if !self.set_state(ModuleState::Stopping) {
            return Ok(());
        }
        self.fire(ModuleEventKind::Stopping);

        let hook = match (self.inner.activator.get(), self.context()) {
            (Some(activator), Some(context)) => activator.stop(&context).await,
            _ => Ok(()),
        };

        if self.set_state(ModuleState::Installed) {
            self.fire(ModuleEventKind::Stopped);
        }
        self.destroy_context();

        match hook {
            Ok(()) => {
                info!(module_id = %self.inner.id, identity = %self.identity(), "Module stopped");
                Ok(())
            },
            Err(source) => Err(RuntimeError::ActivationFailure {
                module: self.identity().clone(),
                source,
            }),
        }
    }

    /// Stop the module if needed and remove it from the runtime.
    ///
    /// A failing stop is logged and does not prevent uninstallation. If the
    /// start/stop lock stays busy, for example because a start hook is still
    /// running, the module is uninstalled without it; the in-flight
    /// transition then finds the module `UNINSTALLED` and backs out.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidState`] if the module is already
    /// uninstalled.
    pub async fn uninstall(&self) -> RuntimeResult<()> {
        self.ensure_installed("uninstall")?;
        if let Err(e) = self.stop().await {
            warn!(
                module_id = %self.inner.id,
                identity = %self.identity(),
                error = %e,
                "Stop failed during uninstall, continuing"
            );
        }

        {
            let _guard = match self.lock_transition().await {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!(
                        module_id = %self.inner.id,
                        identity = %self.identity(),
                        error = %e,
                        "Start/stop lock busy during uninstall, continuing"
                    );
                    None
                },
            };
            if !self.set_state(ModuleState::Uninstalled) {
                return Err(self.invalid_state("uninstall"));
            }
            self.destroy_context();
        }
        // Fired outside the start/stop lock: synchronous listeners may update
        // resource stores, and store locks never nest inside a module lock.
        self.fire(ModuleEventKind::Uninstalled);

        if let Some(shared) = self.inner.runtime.upgrade() {
            shared.remove_module(self.inner.id);
        }
        info!(module_id = %self.inner.id, identity = %self.identity(), "Module uninstalled");
        Ok(())
    }

    /// Complete installation: fire `INSTALLED`, resolve, fire `RESOLVED`.
    pub(crate) async fn resolve(&self) {
        self.fire(ModuleEventKind::Installed);
        let _guard = self.inner.transition.lock().await;
        self.set_state(ModuleState::Resolved);
        self.fire(ModuleEventKind::Resolved);
        debug!(module_id = %self.inner.id, identity = %self.identity(), "Module resolved");
    }

    async fn activate(&self, context: &ModuleContext) -> anyhow::Result<()> {
        let Some(name) = self.inner.activator_name.as_deref() else {
            return Ok(());
        };
        let activator = self
            .inner
            .activator
            .get_or_try_init(|| async {
                let Some(loader) = self.inner.loader.as_ref() else {
                    anyhow::bail!("activator '{name}' required but no activator loader is configured");
                };
                let activator = loader.load_activator(name, &self.inner.resource)?;
                debug!(module_id = %self.inner.id, activator = %name, "Activator loaded");
                Ok::<_, anyhow::Error>(activator)
            })
            .await?;
        activator.start(context).await
    }

    async fn lock_transition(&self) -> RuntimeResult<MutexGuard<'_, ()>> {
        tokio::time::timeout(self.inner.lock_timeout, self.inner.transition.lock())
            .await
            .map_err(|_| RuntimeError::LockTimeout {
                module: self.identity().clone(),
                timeout: self.inner.lock_timeout,
            })
    }

    fn ensure_installed(&self, operation: &'static str) -> RuntimeResult<()> {
        if self.state().is_uninstalled() {
            Err(self.invalid_state(operation))
        } else {
            Ok(())
        }
    }

    fn invalid_state(&self, operation: &'static str) -> RuntimeError {
        RuntimeError::InvalidState {
            module: self.identity().clone(),
            state: self.state(),
            operation,
        }
    }

    /// Move to `state` unless the module is already uninstalled, which is
    /// terminal. Returns whether the state changed.
    fn set_state(&self, state: ModuleState) -> bool {
        let mut current = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.is_uninstalled() {
            return false;
        }
        *current = state;
        true
    }

    fn destroy_context(&self) {
        let context = self
            .inner
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(context) = context {
            context.destroy();
        }
    }

    fn fire(&self, kind: ModuleEventKind) {
        let Some(shared) = self.inner.runtime.upgrade() else {
            debug!(module_id = %self.inner.id, event_kind = %kind, "Runtime gone, event dropped");
            return;
        };
        shared.dispatcher.fire(ModuleEvent::new(
            shared.config.name.clone(),
            kind,
            self.inner.id,
            Arc::clone(&self.inner.resource),
        ));
    }
}
