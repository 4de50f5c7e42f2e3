//! Dependency resolution and provisioning.

use std::collections::HashSet;
use std::sync::Arc;

use tessera_resource::{
    Capability, DefaultMatchPolicy, MatchPolicy, Requirement, Resource, ResourceIdentity,
    ResourceIndex, Wire,
};
use tracing::{debug, error, info};

use crate::error::{ProvisionError, ProvisionResult};
use crate::installer::{ResourceHandle, ResourceInstaller};

/// The outcome of resolution, before anything is installed.
#[derive(Debug, Clone, Default)]
pub struct ProvisionPlan {
    /// Resources to install, dependencies before dependents.
    pub resources: Vec<Arc<Resource>>,
    /// Every resolved edge, including edges into the environment.
    pub wires: Vec<Wire>,
}

impl ProvisionPlan {
    /// Whether nothing needs installing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Identities to install, in order.
    #[must_use]
    pub fn identities(&self) -> Vec<&ResourceIdentity> {
        self.resources.iter().map(|r| r.identity()).collect()
    }
}

/// Turns requirements into installed resources.
///
/// Providers are looked up in the environment first, then among resources
/// already chosen for the same call, then in the repository, where the
/// highest version wins. Repository resources are resolved depth-first so
/// that every dependency is installed before its dependents.
pub struct Provisioner {
    environment: Arc<dyn ResourceIndex>,
    repository: Arc<dyn ResourceIndex>,
    installer: Arc<dyn ResourceInstaller>,
    policy: Arc<dyn MatchPolicy>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("environment", &self.environment.name())
            .field("repository", &self.repository.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Create a provisioner.
    #[must_use]
    pub fn new(
        environment: Arc<dyn ResourceIndex>,
        repository: Arc<dyn ResourceIndex>,
        installer: Arc<dyn ResourceInstaller>,
    ) -> Self {
        Self {
            environment,
            repository,
            installer,
            policy: Arc::new(DefaultMatchPolicy),
        }
    }

    /// Replace the policy used to match resources chosen within a call.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn MatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve `requirements` without installing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsatisfiedRequirement`] if a mandatory
    /// requirement has no provider, and [`ProvisionError::ResolutionCycle`]
    /// if repository resources depend on each other in a cycle.
    pub fn plan(&self, requirements: &[Requirement]) -> ProvisionResult<ProvisionPlan> {
        let mut planner = Planner {
            provisioner: self,
            plan: ProvisionPlan::default(),
            planned: HashSet::new(),
            visiting: Vec::new(),
        };
        for requirement in requirements {
            planner.resolve(&Arc::new(requirement.clone()), None)?;
        }
        debug!(
            resources = planner.plan.resources.len(),
            wires = planner.plan.wires.len(),
            "Provisioning plan computed"
        );
        Ok(planner.plan)
    }

    /// Resolve `requirements` and install what is missing.
    ///
    /// Handles are returned in install order. If any installation fails, the
    /// ones already made by this call are uninstalled in reverse order and
    /// the failure is returned.
    ///
    /// # Errors
    ///
    /// Returns resolution errors from [`plan`](Self::plan), or
    /// [`ProvisionError::Install`] if the installer fails.
    pub async fn provision_resources(
        &self,
        requirements: &[Requirement],
    ) -> ProvisionResult<Vec<Box<dyn ResourceHandle>>> {
        let plan = self.plan(requirements)?;
        self.execute(&plan).await
    }

    /// Install the resources of `plan` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Install`] after rolling back if the
    /// installer fails.
    pub async fn execute(&self, plan: &ProvisionPlan) -> ProvisionResult<Vec<Box<dyn ResourceHandle>>> {
        let mut handles: Vec<Box<dyn ResourceHandle>> = Vec::with_capacity(plan.resources.len());
        for resource in &plan.resources {
            match self.installer.install(Arc::clone(resource)).await {
                Ok(handle) => {
                    debug!(identity = %resource.identity(), "Provisioned resource");
                    handles.push(handle);
                },
                Err(source) => {
                    error!(
                        identity = %resource.identity(),
                        error = %source,
                        rollback = handles.len(),
                        "Provisioning failed, rolling back"
                    );
                    rollback(handles).await;
                    return Err(ProvisionError::Install {
                        resource: resource.identity().clone(),
                        source,
                    });
                },
            }
        }
        info!(installed = handles.len(), "Provisioning complete");
        Ok(handles)
    }
}

async fn rollback(handles: Vec<Box<dyn ResourceHandle>>) {
    for handle in handles.into_iter().rev() {
        if let Err(e) = handle.uninstall().await {
            error!(
                identity = %handle.resource().identity(),
                error = %e,
                "Rollback failed to uninstall resource"
            );
        }
    }
}

struct Planner<'a> {
    provisioner: &'a Provisioner,
    plan: ProvisionPlan,
    planned: HashSet<ResourceIdentity>,
    visiting: Vec<Arc<Resource>>,
}

enum Provider {
    Existing(Arc<Capability>, Arc<Resource>),
    Candidate(Arc<Capability>, Arc<Resource>),
}

impl Planner<'_> {
    fn resolve(
        &mut self,
        requirement: &Arc<Requirement>,
        requirer: Option<&Arc<Resource>>,
    ) -> ProvisionResult<()> {
        let Some(provider) = self.find_provider(requirement, requirer) else {
            if requirement.is_optional() {
                debug!(requirement = %requirement, "Optional requirement left unresolved");
                return Ok(());
            }
            return Err(ProvisionError::UnsatisfiedRequirement {
                requirement: requirement.to_string(),
                requirer: requirer.map(|r| r.identity().clone()),
            });
        };

        let (capability, resource) = match provider {
            Provider::Existing(capability, resource) => (capability, resource),
            Provider::Candidate(capability, resource) => {
                self.visit(&resource)?;
                (capability, resource)
            },
        };
        let wire = Wire::new(
            capability,
            Arc::clone(requirement),
            resource,
            requirer.cloned(),
        )?;
        self.plan.wires.push(wire);
        Ok(())
    }

    fn find_provider(
        &self,
        requirement: &Requirement,
        requirer: Option<&Arc<Resource>>,
    ) -> Option<Provider> {
        let policy = &self.provisioner.policy;

        if let Some(requirer) = requirer
            && let Some(capability) = requirer
                .capabilities()
                .iter()
                .find(|c| policy.matches(c, requirement))
        {
            return Some(Provider::Existing(Arc::clone(capability), Arc::clone(requirer)));
        }

        let environment = &self.provisioner.environment;
        for capability in environment.find_providers(requirement) {
            if let Some(resource) = environment.get_resource(capability.resource()) {
                return Some(Provider::Existing(capability, resource));
            }
        }

        for resource in &self.plan.resources {
            if let Some(capability) = resource
                .capabilities()
                .iter()
                .find(|c| policy.matches(c, requirement))
            {
                return Some(Provider::Existing(Arc::clone(capability), Arc::clone(resource)));
            }
        }

        let repository = &self.provisioner.repository;
        let mut best: Option<(Arc<Capability>, Arc<Resource>)> = None;
        for capability in repository.find_providers(requirement) {
            let Some(resource) = repository.get_resource(capability.resource()) else {
                continue;
            };
            let better = best
                .as_ref()
                .is_none_or(|(_, current)| resource.identity().version() > current.identity().version());
            if better {
                best = Some((capability, resource));
            }
        }
        best.map(|(capability, resource)| Provider::Candidate(capability, resource))
    }

    fn visit(&mut self, resource: &Arc<Resource>) -> ProvisionResult<()> {
        let identity = resource.identity();
        if self.planned.contains(identity) {
            return Ok(());
        }
        if let Some(start) = self
            .visiting
            .iter()
            .position(|r| r.identity() == identity)
        {
            let mut path: Vec<ResourceIdentity> = self
                .visiting
                .iter()
                .skip(start)
                .map(|r| r.identity().clone())
                .collect();
            path.push(identity.clone());
            return Err(ProvisionError::ResolutionCycle { path });
        }

        self.visiting.push(Arc::clone(resource));
        for requirement in resource.requirements() {
            self.resolve(requirement, Some(resource))?;
        }
        self.visiting.pop();

        self.planned.insert(identity.clone());
        self.plan.resources.push(Arc::clone(resource));
        debug!(identity = %identity, position = self.plan.resources.len(), "Resource planned");
        Ok(())
    }
}
