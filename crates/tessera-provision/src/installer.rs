//! Host installers and the handles they return.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_resource::Resource;
use tessera_runtime::{Module, ModuleSpec, Runtime};
use tracing::{info, warn};

/// Something installed by a [`ResourceInstaller`] that can be taken back.
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    /// The installed resource.
    fn resource(&self) -> &Arc<Resource>;

    /// Undo the installation.
    ///
    /// # Errors
    ///
    /// Returns an error if the host could not remove the resource.
    async fn uninstall(&self) -> anyhow::Result<()>;
}

impl std::fmt::Debug for dyn ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceHandle[{}]", self.resource().identity())
    }
}

/// Performs the host-specific act of installing a resolved resource.
#[async_trait]
pub trait ResourceInstaller: Send + Sync {
    /// Install `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the resource. Nothing may remain
    /// installed in that case.
    async fn install(&self, resource: Arc<Resource>) -> anyhow::Result<Box<dyn ResourceHandle>>;
}

/// Installs resources as modules of an embedded [`Runtime`] and starts them.
#[derive(Debug, Clone)]
pub struct RuntimeResourceInstaller {
    runtime: Runtime,
}

impl RuntimeResourceInstaller {
    /// Install into `runtime`.
    #[must_use]
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ResourceInstaller for RuntimeResourceInstaller {
    async fn install(&self, resource: Arc<Resource>) -> anyhow::Result<Box<dyn ResourceHandle>> {
        let module = self
            .runtime
            .install_module(ModuleSpec::new(Arc::clone(&resource)))
            .await?;
        if let Err(e) = module.start().await {
            if let Err(cleanup) = module.uninstall().await {
                warn!(
                    identity = %resource.identity(),
                    error = %cleanup,
                    "Failed to remove module after failed start"
                );
            }
            return Err(e.into());
        }
        info!(module_id = %module.id(), identity = %resource.identity(), "Resource installed as module");
        Ok(Box::new(ModuleHandle { resource, module }))
    }
}

/// Handle of a resource installed as a runtime module.
#[derive(Debug)]
pub struct ModuleHandle {
    resource: Arc<Resource>,
    module: Module,
}

impl ModuleHandle {
    /// The module backing this handle.
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }
}

#[async_trait]
impl ResourceHandle for ModuleHandle {
    fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    async fn uninstall(&self) -> anyhow::Result<()> {
        self.module.uninstall().await?;
        Ok(())
    }
}
