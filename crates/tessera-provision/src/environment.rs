//! The resources a running system already offers.

use std::sync::Arc;

use tessera_events::{FnListener, ListenerId, ListenerTier, ModuleEvent, ModuleEventKind};
use tessera_resource::{
    Capability, Requirement, Resource, ResourceIdentity, ResourceIndex, ResourceResult,
    ResourceStore,
};
use tessera_runtime::Runtime;
use tracing::{debug, warn};

/// Host-provided resources plus the resources of installed modules.
///
/// The runtime store follows the runtime's module table through a
/// synchronous listener, so it is current as soon as `install_module` or
/// `uninstall` has fired its event. Queries consult the system store first.
pub struct RuntimeEnvironment {
    system: Arc<ResourceStore>,
    installed: Arc<ResourceStore>,
    runtime: Runtime,
    listener: ListenerId,
}

impl std::fmt::Debug for RuntimeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnvironment")
            .field("runtime", &self.runtime.name())
            .field("system", &self.system.len())
            .field("installed", &self.installed.len())
            .finish_non_exhaustive()
    }
}

impl RuntimeEnvironment {
    /// Track `runtime`. Modules already installed are picked up immediately.
    #[must_use]
    pub fn new(runtime: &Runtime) -> Self {
        let system = Arc::new(ResourceStore::new(format!("{}-system", runtime.name())));
        let installed = Arc::new(ResourceStore::new(format!("{}-runtime", runtime.name())));

        let store = Arc::clone(&installed);
        let listener = runtime.add_module_listener(
            Arc::new(
                FnListener::new("runtime-environment", move |event: &ModuleEvent| {
                    track(&store, event);
                })
                .with_filter(|event| {
                    matches!(
                        event.kind,
                        ModuleEventKind::Installed | ModuleEventKind::Uninstalled
                    )
                }),
            ),
            ListenerTier::Synchronous,
        );

        for module in runtime.modules() {
            if !installed.contains(module.identity()) {
                let _ = installed.add_resource(Arc::clone(module.resource()));
            }
        }

        Self {
            system,
            installed,
            runtime: runtime.clone(),
            listener,
        }
    }

    /// Add a host-provided resource.
    ///
    /// # Errors
    ///
    /// Returns [`tessera_resource::ResourceError::DuplicateIdentity`] if it is
    /// already present.
    pub fn add_system_resource(
        &self,
        resource: impl Into<Arc<Resource>>,
    ) -> ResourceResult<Arc<Resource>> {
        self.system.add_resource(resource)
    }

    /// Host-provided resources.
    #[must_use]
    pub fn system_store(&self) -> &Arc<ResourceStore> {
        &self.system
    }

    /// Resources of installed modules.
    #[must_use]
    pub fn runtime_store(&self) -> &Arc<ResourceStore> {
        &self.installed
    }

    /// The tracked runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// An independent copy of the installed resources layered over the live
    /// system store. Later installs and uninstalls do not show up in it.
    #[must_use]
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            system: Arc::clone(&self.system),
            installed: self
                .installed
                .copy_as(format!("{}-snapshot", self.installed.name())),
        }
    }
}

impl Drop for RuntimeEnvironment {
    fn drop(&mut self) {
        self.runtime.remove_module_listener(self.listener);
    }
}

fn track(store: &ResourceStore, event: &ModuleEvent) {
    match event.kind {
        ModuleEventKind::Installed => match store.add_resource(Arc::clone(&event.resource)) {
            Ok(_) => debug!(identity = %event.identity(), "Environment gained resource"),
            Err(e) => warn!(identity = %event.identity(), error = %e, "Environment already tracks resource"),
        },
        ModuleEventKind::Uninstalled => {
            if store.remove_resource(event.identity()).is_some() {
                debug!(identity = %event.identity(), "Environment lost resource");
            }
        },
        _ => {},
    }
}

fn union_providers(
    first: &dyn ResourceIndex,
    second: &dyn ResourceIndex,
    requirement: &Requirement,
) -> Vec<Arc<Capability>> {
    let mut providers = first.find_providers(requirement);
    providers.extend(second.find_providers(requirement));
    providers
}

impl ResourceIndex for RuntimeEnvironment {
    fn name(&self) -> &str {
        self.runtime.name()
    }

    fn get_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>> {
        self.system
            .get_resource(identity)
            .or_else(|| self.installed.get_resource(identity))
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<Capability>> {
        union_providers(&*self.system, &*self.installed, requirement)
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        let mut resources = self.system.resources();
        resources.extend(self.installed.resources());
        resources
    }
}

/// A frozen view of a [`RuntimeEnvironment`].
#[derive(Debug)]
pub struct EnvironmentSnapshot {
    system: Arc<ResourceStore>,
    installed: ResourceStore,
}

impl ResourceIndex for EnvironmentSnapshot {
    fn name(&self) -> &str {
        self.installed.name()
    }

    fn get_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>> {
        self.system
            .get_resource(identity)
            .or_else(|| self.installed.get_resource(identity))
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<Capability>> {
        union_providers(&*self.system, &self.installed, requirement)
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        let mut resources = self.system.resources();
        resources.extend(self.installed.resources());
        resources
    }
}
