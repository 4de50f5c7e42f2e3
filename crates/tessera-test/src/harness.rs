//! A temporary repository wired to a runtime.

use std::sync::{Arc, Once};

use tempfile::TempDir;
use tessera_events::{ListenerId, ListenerTier};
use tessera_provision::{
    ProvisionResult, Provisioner, ResourceHandle, RuntimeEnvironment, RuntimeResourceInstaller,
};
use tessera_repository::{PersistentRepository, RepositoryConfig};
use tessera_resource::Requirement;
use tessera_runtime::{ActivatorRegistry, Runtime, RuntimeConfig};

use crate::mocks::RecordingListener;

static LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per process. Honors `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A persistent repository in a temporary directory, a runtime with an
/// activator registry, and the environment tracking that runtime.
///
/// The temporary directory is removed when the host is dropped.
pub struct TestHost {
    dir: TempDir,
    repository: Arc<PersistentRepository>,
    activators: Arc<ActivatorRegistry>,
    runtime: Runtime,
    environment: Arc<RuntimeEnvironment>,
}

impl std::fmt::Debug for TestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHost")
            .field("dir", &self.dir.path())
            .field("modules", &self.runtime.len())
            .finish_non_exhaustive()
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    /// Create a host with default runtime settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime_config(RuntimeConfig::default())
    }

    /// Create a host with the given runtime settings. Module data goes
    /// under the temporary directory unless `config` names a data dir.
    #[must_use]
    pub fn with_runtime_config(config: RuntimeConfig) -> Self {
        init_test_logging();
        let dir = tempfile::tempdir().expect("temporary directory");
        let repository = Arc::new(
            PersistentRepository::open(RepositoryConfig::new(dir.path().join("repository")))
                .expect("open repository"),
        );
        let config = if config.data_dir.is_none() {
            config.with_data_dir(dir.path().join("data"))
        } else {
            config
        };
        let activators = Arc::new(ActivatorRegistry::new());
        let runtime = Runtime::with_activator_loader(config, Arc::clone(&activators) as _);
        let environment = Arc::new(RuntimeEnvironment::new(&runtime));
        Self {
            dir,
            repository,
            activators,
            runtime,
            environment,
        }
    }

    /// The temporary root.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// The repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<PersistentRepository> {
        &self.repository
    }

    /// Activators available to modules of this host.
    #[must_use]
    pub fn activators(&self) -> &ActivatorRegistry {
        &self.activators
    }

    /// The runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The environment tracking the runtime.
    #[must_use]
    pub fn environment(&self) -> &Arc<RuntimeEnvironment> {
        &self.environment
    }

    /// A provisioner installing from the repository into the runtime.
    #[must_use]
    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(
            Arc::clone(&self.environment) as _,
            Arc::clone(&self.repository) as _,
            Arc::new(RuntimeResourceInstaller::new(self.runtime.clone())),
        )
    }

    /// Provision `requirements` into the runtime.
    ///
    /// # Errors
    ///
    /// Returns whatever the provisioner reports.
    pub async fn provision(
        &self,
        requirements: &[Requirement],
    ) -> ProvisionResult<Vec<Box<dyn ResourceHandle>>> {
        self.provisioner().provision_resources(requirements).await
    }

    /// Register a synchronous [`RecordingListener`] on the runtime.
    #[must_use]
    pub fn record_events(&self) -> (Arc<RecordingListener>, ListenerId) {
        let listener = Arc::new(RecordingListener::new());
        let id = self
            .runtime
            .add_module_listener(Arc::clone(&listener) as _, ListenerTier::Synchronous);
        (listener, id)
    }
}
