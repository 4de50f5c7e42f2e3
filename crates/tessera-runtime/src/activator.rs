//! Activator hooks and the loader that supplies them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, PoisonError};

use async_trait::async_trait;
use tessera_resource::Resource;
use tracing::debug;

use crate::context::ModuleContext;

/// Start and stop hooks of a module.
///
/// An activator is loaded at most once per module and reused across
/// restarts.
#[async_trait]
pub trait ModuleActivator: Send + Sync {
    /// Called while the module is `STARTING`. An error aborts the start and
    /// returns the module to `INSTALLED`.
    async fn start(&self, context: &ModuleContext) -> anyhow::Result<()>;

    /// Called while the module is `STOPPING`. An error is reported after the
    /// module has returned to `INSTALLED`.
    async fn stop(&self, context: &ModuleContext) -> anyhow::Result<()>;
}

/// Instantiates activators by name.
pub trait ActivatorLoader: Send + Sync {
    /// Load the activator `name` for `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if no activator of that name can be provided.
    fn load_activator(&self, name: &str, resource: &Resource)
    -> anyhow::Result<Arc<dyn ModuleActivator>>;
}

/// Creates a fresh activator.
pub type ActivatorFactory = Arc<dyn Fn() -> Arc<dyn ModuleActivator> + Send + Sync>;

/// An [`ActivatorLoader`] backed by factories registered under a name.
#[derive(Default)]
pub struct ActivatorRegistry {
    factories: RwLock<HashMap<String, ActivatorFactory>>,
}

impl std::fmt::Debug for ActivatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = factories.keys().collect();
        names.sort();
        f.debug_struct("ActivatorRegistry")
            .field("activators", &names)
            .finish()
    }
}

impl ActivatorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ModuleActivator> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(activator = %name, "Activator registered");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(factory));
    }

    /// Register a shared instance under `name`.
    pub fn register_instance(&self, name: impl Into<String>, activator: Arc<dyn ModuleActivator>) {
        self.register(name, move || Arc::clone(&activator));
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl ActivatorLoader for ActivatorRegistry {
    fn load_activator(
        &self,
        name: &str,
        resource: &Resource,
    ) -> anyhow::Result<Arc<dyn ModuleActivator>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match factory {
            Some(factory) => Ok(factory()),
            None => anyhow::bail!(
                "no activator named '{name}' is available for {}",
                resource.identity()
            ),
        }
    }
}
