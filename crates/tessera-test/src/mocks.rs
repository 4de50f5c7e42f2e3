//! Recording implementations of the runtime and provisioning hooks.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tessera_events::{ModuleEvent, ModuleEventKind, ModuleListener};
use tessera_provision::{ResourceHandle, ResourceInstaller};
use tessera_resource::{Resource, ResourceIdentity};
use tessera_runtime::{ModuleActivator, ModuleContext};

/// Captures every event it is handed.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ModuleEvent>>,
}

impl RecordingListener {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<ModuleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded event kinds, in delivery order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ModuleEventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    /// Recorded `(symbolic name, kind)` pairs, in delivery order.
    #[must_use]
    pub fn transitions(&self) -> Vec<(String, ModuleEventKind)> {
        self.events()
            .iter()
            .map(|e| (e.identity().symbolic_name().to_string(), e.kind))
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ModuleListener for RecordingListener {
    fn module_changed(&self, event: &ModuleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "recording-listener"
    }
}

/// Start and stop counts shared between a [`RecordingActivator`] and a test.
#[derive(Debug, Default)]
pub struct ActivatorCalls {
    calls: Mutex<Vec<String>>,
}

impl ActivatorCalls {
    /// Recorded calls as `"start:<name>"` or `"stop:<name>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls with the given prefix (`"start"` or `"stop"`).
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

/// Activator that records its calls and can be told to fail.
#[derive(Debug)]
pub struct RecordingActivator {
    calls: Arc<ActivatorCalls>,
    fail_start: bool,
    fail_stop: bool,
}

impl RecordingActivator {
    /// An activator whose hooks succeed.
    #[must_use]
    pub fn new(calls: Arc<ActivatorCalls>) -> Self {
        Self {
            calls,
            fail_start: false,
            fail_stop: false,
        }
    }

    /// Make the start hook fail.
    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make the stop hook fail.
    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }
}

#[async_trait]
impl ModuleActivator for RecordingActivator {
    async fn start(&self, context: &ModuleContext) -> anyhow::Result<()> {
        let name = context.identity().symbolic_name();
        self.calls.record(format!("start:{name}"));
        if self.fail_start {
            anyhow::bail!("start of {name} refused");
        }
        Ok(())
    }

    async fn stop(&self, context: &ModuleContext) -> anyhow::Result<()> {
        let name = context.identity().symbolic_name();
        self.calls.record(format!("stop:{name}"));
        if self.fail_stop {
            anyhow::bail!("stop of {name} refused");
        }
        Ok(())
    }
}

/// Installer that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    installed: Mutex<Vec<ResourceIdentity>>,
    uninstalled: Arc<Mutex<Vec<ResourceIdentity>>>,
    fail_on: Option<String>,
}

impl RecordingInstaller {
    /// An installer that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse resources with this symbolic name.
    #[must_use]
    pub fn failing_on(mut self, symbolic_name: impl Into<String>) -> Self {
        self.fail_on = Some(symbolic_name.into());
        self
    }

    /// Symbolic names installed so far, in order.
    #[must_use]
    pub fn installed(&self) -> Vec<String> {
        names(&self.installed)
    }

    /// Symbolic names uninstalled so far, in order.
    #[must_use]
    pub fn uninstalled(&self) -> Vec<String> {
        names(&self.uninstalled)
    }
}

fn names(list: &Mutex<Vec<ResourceIdentity>>) -> Vec<String> {
    list.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|id| id.symbolic_name().to_string())
        .collect()
}

#[async_trait]
impl ResourceInstaller for RecordingInstaller {
    async fn install(&self, resource: Arc<Resource>) -> anyhow::Result<Box<dyn ResourceHandle>> {
        let identity = resource.identity().clone();
        if self.fail_on.as_deref() == Some(identity.symbolic_name()) {
            anyhow::bail!("host refused {identity}");
        }
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(identity);
        Ok(Box::new(RecordedHandle {
            resource,
            uninstalled: Arc::clone(&self.uninstalled),
        }))
    }
}

struct RecordedHandle {
    resource: Arc<Resource>,
    uninstalled: Arc<Mutex<Vec<ResourceIdentity>>>,
}

#[async_trait]
impl ResourceHandle for RecordedHandle {
    fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    async fn uninstall(&self) -> anyhow::Result<()> {
        self.uninstalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.resource.identity().clone());
        Ok(())
    }
}
