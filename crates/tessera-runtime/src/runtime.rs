//! The runtime and its module table.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tessera_events::{EventDispatcher, ListenerId, ListenerTier, ModuleId, ModuleListener};
use tessera_resource::ResourceIdentity;
use tracing::{debug, info, warn};

use crate::activator::ActivatorLoader;
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::module::{Module, ModuleSpec};

pub(crate) struct RuntimeShared {
    pub(crate) config: RuntimeConfig,
    pub(crate) dispatcher: EventDispatcher,
    modules: RwLock<BTreeMap<ModuleId, Module>>,
    next_id: AtomicU64,
    loader: Option<Arc<dyn ActivatorLoader>>,
}

impl RuntimeShared {
    pub(crate) fn remove_module(&self, id: ModuleId) {
        let removed = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!(module_id = %id, "Module removed from table");
        }
    }
}

/// Hosts modules and delivers their lifecycle events.
///
/// `Runtime` is a cheap handle; clones refer to the same runtime. Modules
/// only hold a weak reference back, so dropping every `Runtime` handle lets
/// the runtime go away even while modules are installed.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.shared.config.name)
            .field("modules", &self.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Create a runtime without a default activator loader.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the event delivery
    /// worker is spawned immediately.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a runtime that loads activators through `loader` unless a
    /// module brings its own.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn with_activator_loader(config: RuntimeConfig, loader: Arc<dyn ActivatorLoader>) -> Self {
        Self::build(config, Some(loader))
    }

    fn build(config: RuntimeConfig, loader: Option<Arc<dyn ActivatorLoader>>) -> Self {
        let dispatcher = EventDispatcher::with_warn_depth(config.event_queue_warn_depth);
        info!(runtime = %config.name, "Runtime created");
        Self {
            shared: Arc::new(RuntimeShared {
                config,
                dispatcher,
                modules: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                loader,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<RuntimeShared>) -> Self {
        Self { shared }
    }

    /// Runtime settings.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Runtime name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The event dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }

    /// Install a module.
    ///
    /// The module is in the table when `INSTALLED` fires and has reached
    /// `RESOLVED` when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::DuplicateIdentity`] if a module with the same
    /// identity is installed.
    pub async fn install_module(&self, spec: ModuleSpec) -> RuntimeResult<Module> {
        let module = {
            let mut modules = self
                .shared
                .modules
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let identity = spec.resource().identity();
            if modules.values().any(|m| m.identity() == identity) {
                return Err(RuntimeError::DuplicateIdentity(identity.clone()));
            }
            let id = ModuleId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
            let module = Module::new(
                id,
                spec,
                self.shared.loader.clone(),
                self.shared.config.lock_timeout,
                self.shared.config.data_dir.clone(),
                Arc::downgrade(&self.shared),
            );
            modules.insert(id, module.clone());
            module
        };

        module.resolve().await;
        info!(
            runtime = %self.shared.config.name,
            module_id = %module.id(),
            identity = %module.identity(),
            "Module installed"
        );
        Ok(module)
    }

    /// Module by id.
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<Module> {
        self.shared
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Module by resource identity.
    #[must_use]
    pub fn module_by_identity(&self, identity: &ResourceIdentity) -> Option<Module> {
        self.shared
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|m| m.identity() == identity)
            .cloned()
    }

    /// Snapshot of all installed modules, ordered by id.
    #[must_use]
    pub fn modules(&self) -> Vec<Module> {
        self.shared
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of installed modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no module is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a lifecycle listener.
    pub fn add_module_listener(
        &self,
        listener: Arc<dyn ModuleListener>,
        tier: ListenerTier,
    ) -> ListenerId {
        self.shared.dispatcher.add_listener(listener, tier)
    }

    /// Unregister a lifecycle listener.
    pub fn remove_module_listener(&self, id: ListenerId) -> bool {
        self.shared.dispatcher.remove_listener(id)
    }

    /// Wait until asynchronous listeners have seen every event fired so far.
    pub async fn flush_events(&self) {
        self.shared.dispatcher.flush().await;
    }

    /// Uninstall every module, newest first, then drain and stop event
    /// delivery.
    pub async fn shutdown(&self) {
        let modules = self.modules();
        info!(runtime = %self.shared.config.name, modules = modules.len(), "Runtime shutting down");
        for module in modules.iter().rev() {
            if module.state().is_uninstalled() {
                continue;
            }
            if let Err(e) = module.uninstall().await {
                warn!(
                    module_id = %module.id(),
                    identity = %module.identity(),
                    error = %e,
                    "Failed to uninstall module during shutdown"
                );
            }
        }
        self.shared.dispatcher.shutdown().await;
        info!(runtime = %self.shared.config.name, "Runtime shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tessera_events::{FnListener, ModuleEvent, ModuleEventKind};
    use tessera_resource::{Resource, Version};

    use super::*;
    use crate::activator::{ActivatorRegistry, ModuleActivator};
    use crate::context::ModuleContext;
    use crate::state::ModuleState;

    #[derive(Default)]
    struct Counting {
        starts: Mutex<u32>,
        stops: Mutex<u32>,
        fail_start: bool,
        fail_stop: bool,
        start_delay: Option<Duration>,
    }

    #[async_trait]
    impl ModuleActivator for Counting {
        async fn start(&self, _context: &ModuleContext) -> anyhow::Result<()> {
            if let Some(delay) = self.start_delay {
                tokio::time::sleep(delay).await;
            }
            *self.starts.lock().unwrap() += 1;
            if self.fail_start {
                anyhow::bail!("start refused");
            }
            Ok(())
        }

        async fn stop(&self, _context: &ModuleContext) -> anyhow::Result<()> {
            *self.stops.lock().unwrap() += 1;
            if self.fail_stop {
                anyhow::bail!("stop refused");
            }
            Ok(())
        }
    }

    fn resource(name: &str) -> Resource {
        Resource::builder()
            .identity(name, Version::new(1, 0, 0))
            .build()
            .unwrap()
    }

    fn runtime_with(name: &str, activator: Arc<Counting>) -> Runtime {
        let registry = ActivatorRegistry::new();
        registry.register_instance(name, activator);
        Runtime::with_activator_loader(RuntimeConfig::default(), Arc::new(registry))
    }

    fn record(runtime: &Runtime) -> Arc<Mutex<Vec<ModuleEventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        runtime.add_module_listener(
            Arc::new(FnListener::new("record", move |event: &ModuleEvent| {
                sink.lock().unwrap().push(event.kind);
            })),
            ListenerTier::Synchronous,
        );
        seen
    }

    #[tokio::test]
    async fn test_full_lifecycle_visits_states_in_order() {
        let activator = Arc::new(Counting::default());
        let runtime = runtime_with("Main", Arc::clone(&activator));
        let events = record(&runtime);

        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")).with_activator("Main"))
            .await
            .unwrap();
        assert_eq!(module.state(), ModuleState::Resolved);

        module.start().await.unwrap();
        assert_eq!(module.state(), ModuleState::Active);
        assert!(module.context().unwrap().is_valid());

        module.stop().await.unwrap();
        assert_eq!(module.state(), ModuleState::Installed);
        assert!(module.context().is_none());

        module.uninstall().await.unwrap();
        assert_eq!(module.state(), ModuleState::Uninstalled);
        assert!(runtime.module(module.id()).is_none());

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ModuleEventKind::Installed,
                ModuleEventKind::Resolved,
                ModuleEventKind::Starting,
                ModuleEventKind::Started,
                ModuleEventKind::Stopping,
                ModuleEventKind::Stopped,
                ModuleEventKind::Uninstalled,
            ]
        );
        assert_eq!(*activator.starts.lock().unwrap(), 1);
        assert_eq!(*activator.stops.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let activator = Arc::new(Counting::default());
        let runtime = runtime_with("Main", Arc::clone(&activator));
        let events = record(&runtime);
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")).with_activator("Main"))
            .await
            .unwrap();

        module.stop().await.unwrap();
        module.start().await.unwrap();
        module.start().await.unwrap();
        assert_eq!(*activator.starts.lock().unwrap(), 1);

        let starting = events
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == ModuleEventKind::Starting)
            .count();
        assert_eq!(starting, 1);
        assert_eq!(events.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_start_returns_to_installed() {
        let activator = Arc::new(Counting {
            fail_start: true,
            ..Counting::default()
        });
        let runtime = runtime_with("Main", activator);
        let events = record(&runtime);
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")).with_activator("Main"))
            .await
            .unwrap();

        let err = module.start().await.unwrap_err();
        match err {
            RuntimeError::ActivationFailure { module: identity, source } => {
                assert_eq!(identity.symbolic_name(), "alpha");
                assert_eq!(source.to_string(), "start refused");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(module.state(), ModuleState::Installed);
        assert!(module.context().is_none());
        assert_eq!(
            events.lock().unwrap()[2..],
            [
                ModuleEventKind::Starting,
                ModuleEventKind::Stopping,
                ModuleEventKind::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_activator_fails_start() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let module = runtime
            .install_module(ModuleSpec::new(
                Resource::builder()
                    .identity("alpha", Version::new(1, 0, 0))
                    .activator("Nowhere")
                    .build()
                    .unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(module.activator_name(), Some("Nowhere"));
        assert!(matches!(
            module.start().await,
            Err(RuntimeError::ActivationFailure { .. })
        ));
        assert_eq!(module.state(), ModuleState::Installed);
    }

    #[tokio::test]
    async fn test_module_without_activator_starts() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let module = runtime
            .install_module(ModuleSpec::new(resource("plain")))
            .await
            .unwrap();
        module.start().await.unwrap();
        assert_eq!(module.state(), ModuleState::Active);
    }

    #[tokio::test]
    async fn test_activator_is_loaded_once_across_restarts() {
        let loads = Arc::new(Mutex::new(0_u32));
        let registry = ActivatorRegistry::new();
        let counter = Arc::clone(&loads);
        registry.register("Main", move || {
            *counter.lock().unwrap() += 1;
            Arc::new(Counting::default()) as Arc<dyn ModuleActivator>
        });
        let runtime = Runtime::with_activator_loader(RuntimeConfig::default(), Arc::new(registry));
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")).with_activator("Main"))
            .await
            .unwrap();

        for _ in 0..3 {
            module.start().await.unwrap();
            module.stop().await.unwrap();
        }
        assert_eq!(*loads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_stop_is_reported_after_cleanup() {
        let activator = Arc::new(Counting {
            fail_stop: true,
            ..Counting::default()
        });
        let runtime = runtime_with("Main", activator);
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")).with_activator("Main"))
            .await
            .unwrap();
        module.start().await.unwrap();

        assert!(matches!(
            module.stop().await,
            Err(RuntimeError::ActivationFailure { .. })
        ));
        assert_eq!(module.state(), ModuleState::Installed);
        assert!(module.context().is_none());
    }

    #[tokio::test]
    async fn test_uninstall_proceeds_when_stop_fails() {
        let activator = Arc::new(Counting {
            fail_stop: true,
            ..Counting::default()
        });
        let runtime = runtime_with("Main", activator);
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")).with_activator("Main"))
            .await
            .unwrap();
        module.start().await.unwrap();

        module.uninstall().await.unwrap();
        assert_eq!(module.state(), ModuleState::Uninstalled);
        assert!(runtime.is_empty());
    }

    #[tokio::test]
    async fn test_uninstalled_module_rejects_transitions() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")))
            .await
            .unwrap();
        module.uninstall().await.unwrap();

        for result in [
            module.start().await,
            module.stop().await,
            module.uninstall().await,
        ] {
            assert!(matches!(
                result,
                Err(RuntimeError::InvalidState {
                    state: ModuleState::Uninstalled,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn test_lock_timeout_bounds_acquisition_only() {
        let activator = Arc::new(Counting {
            start_delay: Some(Duration::from_millis(300)),
            ..Counting::default()
        });
        let registry = ActivatorRegistry::new();
        registry.register_instance("Slow", activator);
        let runtime = Runtime::with_activator_loader(
            RuntimeConfig::default().with_lock_timeout(Duration::from_millis(50)),
            Arc::new(registry),
        );
        let module = runtime
            .install_module(ModuleSpec::new(resource("slow")).with_activator("Slow"))
            .await
            .unwrap();

        let starting = module.clone();
        let start = tokio::spawn(async move { starting.start().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            module.stop().await,
            Err(RuntimeError::LockTimeout { .. })
        ));
        start.await.unwrap().unwrap();
        assert_eq!(module.state(), ModuleState::Active);
    }

    #[tokio::test]
    async fn test_uninstall_proceeds_while_start_hook_holds_lock() {
        let activator = Arc::new(Counting {
            start_delay: Some(Duration::from_millis(300)),
            ..Counting::default()
        });
        let registry = ActivatorRegistry::new();
        registry.register_instance("Slow", Arc::clone(&activator) as Arc<dyn ModuleActivator>);
        let runtime = Runtime::with_activator_loader(
            RuntimeConfig::default().with_lock_timeout(Duration::from_millis(50)),
            Arc::new(registry),
        );
        let module = runtime
            .install_module(ModuleSpec::new(resource("slow")).with_activator("Slow"))
            .await
            .unwrap();

        let starting = module.clone();
        let start = tokio::spawn(async move { starting.start().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        module.uninstall().await.unwrap();
        assert_eq!(module.state(), ModuleState::Uninstalled);
        assert_eq!(runtime.len(), 0);
        assert!(module.context().is_none());

        // The start hook finishes after the uninstall and must not revive it.
        assert!(matches!(
            start.await.unwrap(),
            Err(RuntimeError::InvalidState { .. })
        ));
        assert_eq!(module.state(), ModuleState::Uninstalled);
        assert_eq!(*activator.starts.lock().unwrap(), 1);
        assert_eq!(*activator.stops.lock().unwrap(), 1);
        assert!(matches!(
            module.uninstall().await,
            Err(RuntimeError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_rejected() {
        let runtime = Runtime::new(RuntimeConfig::default());
        runtime
            .install_module(ModuleSpec::new(resource("alpha")))
            .await
            .unwrap();
        assert!(matches!(
            runtime.install_module(ModuleSpec::new(resource("alpha"))).await,
            Err(RuntimeError::DuplicateIdentity(_))
        ));
        assert_eq!(runtime.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_identity() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let a = runtime
            .install_module(ModuleSpec::new(resource("a")))
            .await
            .unwrap();
        let b = runtime
            .install_module(ModuleSpec::new(resource("b")))
            .await
            .unwrap();
        assert!(a.id() < b.id());
        assert_eq!(runtime.module(b.id()).unwrap().identity(), b.identity());
        assert_eq!(
            runtime.module_by_identity(a.identity()).unwrap().id(),
            a.id()
        );
        let ids: Vec<ModuleId> = runtime.modules().iter().map(Module::id).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[tokio::test]
    async fn test_context_listeners_are_removed_on_stop() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")))
            .await
            .unwrap();
        module.start().await.unwrap();

        let context = module.context().unwrap();
        let before = runtime.dispatcher().registry().len();
        context
            .add_module_listener(
                Arc::new(FnListener::new("ctx", |_: &ModuleEvent| {})),
                ListenerTier::Asynchronous,
            )
            .unwrap();
        assert_eq!(runtime.dispatcher().registry().len(), before + 1);

        module.stop().await.unwrap();
        assert!(!context.is_valid());
        assert_eq!(runtime.dispatcher().registry().len(), before);
        assert!(matches!(
            context.add_module_listener(
                Arc::new(FnListener::new("late", |_: &ModuleEvent| {})),
                ListenerTier::Asynchronous,
            ),
            Err(RuntimeError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_context_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(RuntimeConfig::default().with_data_dir(dir.path()));
        let module = runtime
            .install_module(ModuleSpec::new(resource("alpha")))
            .await
            .unwrap();
        module.start().await.unwrap();

        let context = module.context().unwrap();
        let file = context.data_file("state.json").unwrap().unwrap();
        assert_eq!(
            file,
            dir.path()
                .join(format!("module-{}", module.id().0))
                .join("state.json")
        );
        assert!(file.parent().unwrap().is_dir());

        let bare = Runtime::new(RuntimeConfig::default());
        let other = bare
            .install_module(ModuleSpec::new(resource("beta")))
            .await
            .unwrap();
        other.start().await.unwrap();
        assert!(other.context().unwrap().data_file("x").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_uninstalls_newest_first() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let uninstalled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&uninstalled);
        runtime.add_module_listener(
            Arc::new(
                FnListener::new("uninstalls", move |event: &ModuleEvent| {
                    sink.lock()
                        .unwrap()
                        .push(event.identity().symbolic_name().to_string());
                })
                .with_filter(|event| event.kind == ModuleEventKind::Uninstalled),
            ),
            ListenerTier::Asynchronous,
        );

        for name in ["a", "b", "c"] {
            runtime
                .install_module(ModuleSpec::new(resource(name)))
                .await
                .unwrap()
                .start()
                .await
                .unwrap();
        }
        runtime.shutdown().await;

        assert!(runtime.is_empty());
        assert_eq!(*uninstalled.lock().unwrap(), vec!["c", "b", "a"]);
    }
}
