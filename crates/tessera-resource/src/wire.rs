//! Resolved dependency edges.

use std::fmt;
use std::sync::Arc;

use crate::capability::{Capability, Requirement};
use crate::error::{ResourceError, ResourceResult};
use crate::resource::Resource;

/// One resolved edge: `requirement` of `requirer` is satisfied by
/// `capability` of `provider`.
///
/// Wires are validated on construction and never change afterwards. A
/// top-level query has no requirer.
#[derive(Debug, Clone)]
pub struct Wire {
    capability: Arc<Capability>,
    requirement: Arc<Requirement>,
    provider: Arc<Resource>,
    requirer: Option<Arc<Resource>>,
}

impl Wire {
    /// Creates a wire.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidWire`] if the capability does not
    /// belong to the provider, or the requirement does not belong to the
    /// requirer (or belongs to some resource while no requirer is given).
    pub fn new(
        capability: Arc<Capability>,
        requirement: Arc<Requirement>,
        provider: Arc<Resource>,
        requirer: Option<Arc<Resource>>,
    ) -> ResourceResult<Self> {
        if !provider.has_capability(&capability) {
            return Err(ResourceError::InvalidWire(format!(
                "{capability} is not offered by {provider}"
            )));
        }
        match &requirer {
            Some(requirer) if !requirer.has_requirement(&requirement) => {
                return Err(ResourceError::InvalidWire(format!(
                    "{requirement} is not declared by {requirer}"
                )));
            },
            None if requirement.resource().is_some() => {
                return Err(ResourceError::InvalidWire(format!(
                    "{requirement} belongs to a resource but the wire has no requirer"
                )));
            },
            _ => {},
        }
        Ok(Self {
            capability,
            requirement,
            provider,
            requirer,
        })
    }

    /// The providing capability.
    #[must_use]
    pub fn capability(&self) -> &Arc<Capability> {
        &self.capability
    }

    /// The satisfied requirement.
    #[must_use]
    pub fn requirement(&self) -> &Arc<Requirement> {
        &self.requirement
    }

    /// The providing resource.
    #[must_use]
    pub fn provider(&self) -> &Arc<Resource> {
        &self.provider
    }

    /// The requiring resource; `None` for a top-level query.
    #[must_use]
    pub fn requirer(&self) -> Option<&Arc<Resource>> {
        self.requirer.as_ref()
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirer {
            Some(requirer) => write!(f, "{} -> {}", requirer.identity(), self.provider.identity()),
            None => write!(f, "<query> -> {}", self.provider.identity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn pair() -> (Arc<Resource>, Arc<Resource>) {
        let provider = Resource::builder()
            .identity("provider", Version::new(1, 0, 0))
            .provides("svc", "X")
            .build()
            .unwrap();
        let requirer = Resource::builder()
            .identity("requirer", Version::new(1, 0, 0))
            .require(Requirement::builder("svc").filter("svc=X"))
            .build()
            .unwrap();
        (Arc::new(provider), Arc::new(requirer))
    }

    #[test]
    fn test_valid_wire() {
        let (provider, requirer) = pair();
        let wire = Wire::new(
            Arc::clone(&provider.capabilities()[1]),
            Arc::clone(&requirer.requirements()[0]),
            Arc::clone(&provider),
            Some(Arc::clone(&requirer)),
        )
        .unwrap();
        assert_eq!(wire.to_string(), "requirer:1.0.0 -> provider:1.0.0");
        assert!(wire.provider().has_capability(wire.capability()));
    }

    #[test]
    fn test_foreign_capability_rejected() {
        let (provider, requirer) = pair();
        let result = Wire::new(
            Arc::clone(&requirer.capabilities()[0]),
            Arc::clone(&requirer.requirements()[0]),
            provider,
            Some(Arc::clone(&requirer)),
        );
        assert!(matches!(result, Err(ResourceError::InvalidWire(_))));
    }

    #[test]
    fn test_owned_requirement_needs_requirer() {
        let (provider, requirer) = pair();
        let result = Wire::new(
            Arc::clone(&provider.capabilities()[1]),
            Arc::clone(&requirer.requirements()[0]),
            Arc::clone(&provider),
            None,
        );
        assert!(result.is_err());

        let query = Arc::new(Requirement::generic("svc", "X").unwrap());
        let wire = Wire::new(Arc::clone(&provider.capabilities()[1]), query, provider, None).unwrap();
        assert!(wire.requirer().is_none());
    }
}
