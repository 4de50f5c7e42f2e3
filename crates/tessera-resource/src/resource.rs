//! Resources and the resource builder.

use std::fmt;
use std::sync::Arc;

use crate::attribute::{AttributeValue, Attributes, Directives};
use crate::capability::{Capability, Requirement, RequirementBuilder};
use crate::error::{ResourceError, ResourceResult};
use crate::identity::ResourceIdentity;
use crate::namespace::{content, identity};
use crate::version::Version;

/// An immutable bundle of capabilities and requirements.
///
/// Capabilities and requirements keep their insertion order. Exactly one
/// capability lives in the identity namespace.
#[derive(Debug, Clone)]
pub struct Resource {
    identity: ResourceIdentity,
    capabilities: Vec<Arc<Capability>>,
    requirements: Vec<Arc<Requirement>>,
}

impl Resource {
    /// Starts building a resource.
    #[must_use]
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    /// Identity of this resource.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// All capabilities in insertion order.
    #[must_use]
    pub fn capabilities(&self) -> &[Arc<Capability>] {
        &self.capabilities
    }

    /// Capabilities in `namespace`.
    pub fn capabilities_in<'a>(
        &'a self,
        namespace: &'a str,
    ) -> impl Iterator<Item = &'a Arc<Capability>> + 'a {
        self.capabilities
            .iter()
            .filter(move |c| c.namespace() == namespace)
    }

    /// All requirements in insertion order.
    #[must_use]
    pub fn requirements(&self) -> &[Arc<Requirement>] {
        &self.requirements
    }

    /// The identity capability.
    #[must_use]
    pub fn identity_capability(&self) -> Option<&Arc<Capability>> {
        self.capabilities_in(identity::NAMESPACE).next()
    }

    /// Content capabilities.
    pub fn content_capabilities(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.capabilities_in(content::NAMESPACE)
    }

    /// An attribute of the identity capability.
    #[must_use]
    pub fn identity_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.identity_capability().and_then(|c| c.attribute(name))
    }

    /// Whether `capability` is one of this resource's capabilities.
    #[must_use]
    pub fn has_capability(&self, capability: &Arc<Capability>) -> bool {
        self.capabilities.iter().any(|c| Arc::ptr_eq(c, capability))
    }

    /// Whether `requirement` is one of this resource's requirements.
    #[must_use]
    pub fn has_requirement(&self, requirement: &Arc<Requirement>) -> bool {
        self.requirements.iter().any(|r| Arc::ptr_eq(r, requirement))
    }

    /// A copy of this resource with capabilities passed through `rewrite`.
    ///
    /// `rewrite` returns replacement attributes for a capability or `None` to
    /// keep it. A rewritten capability keeps its directives and drops any
    /// embedded payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewritten resource is no longer valid, for
    /// example when the identity capability loses its name.
    pub fn rewrite_capabilities<F>(&self, mut rewrite: F) -> ResourceResult<Self>
    where
        F: FnMut(&Capability) -> Option<Attributes>,
    {
        let mut builder = ResourceBuilder::default();
        for capability in &self.capabilities {
            let pending = match rewrite(capability) {
                Some(attributes) => PendingCapability {
                    namespace: capability.namespace().to_string(),
                    attributes,
                    directives: capability.directives().clone(),
                    payload: None,
                },
                None => PendingCapability::from_capability(capability),
            };
            builder.capabilities.push(pending);
        }
        builder.requirements = self
            .requirements
            .iter()
            .map(|r| (**r).clone())
            .collect();
        builder.build()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource[{}]", self.identity)
    }
}

#[derive(Debug, Clone)]
struct PendingCapability {
    namespace: String,
    attributes: Attributes,
    directives: Directives,
    payload: Option<Arc<[u8]>>,
}

impl PendingCapability {
    fn from_capability(capability: &Capability) -> Self {
        Self {
            namespace: capability.namespace().to_string(),
            attributes: capability.attributes().clone(),
            directives: capability.directives().clone(),
            payload: capability.shared_payload(),
        }
    }
}

/// Builder for [`Resource`].
///
/// Methods chain by value. The first error is kept and reported by
/// [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct ResourceBuilder {
    capabilities: Vec<PendingCapability>,
    requirements: Vec<Requirement>,
    error: Option<ResourceError>,
}

impl ResourceBuilder {
    /// Adds the identity capability.
    #[must_use]
    pub fn identity(mut self, symbolic_name: impl Into<String>, version: Version) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(identity::NAMESPACE.into(), symbolic_name.into().into());
        attributes.insert(identity::VERSION.into(), version.into());
        self.capabilities.push(PendingCapability {
            namespace: identity::NAMESPACE.into(),
            attributes,
            directives: Directives::new(),
            payload: None,
        });
        self
    }

    /// Sets an attribute on the identity capability added earlier.
    #[must_use]
    pub fn identity_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        let position = self
            .capabilities
            .iter()
            .position(|c| c.namespace == identity::NAMESPACE);
        match position.and_then(|i| self.capabilities.get_mut(i)) {
            Some(cap) => {
                cap.attributes.insert(name.into(), value.into());
            },
            None => self.fail(ResourceError::InvalidIdentity(
                "identity attribute set before identity".into(),
            )),
        }
        self
    }

    /// Sets the resource type.
    #[must_use]
    pub fn resource_type(self, resource_type: &str) -> Self {
        self.identity_attribute(identity::TYPE, resource_type)
    }

    /// Names the activator a module of this resource starts with.
    #[must_use]
    pub fn activator(self, activator: &str) -> Self {
        self.identity_attribute(identity::ACTIVATOR, activator)
    }

    /// Names the runtime that should host this resource.
    #[must_use]
    pub fn runtime_name(self, runtime_name: &str) -> Self {
        self.identity_attribute(identity::RUNTIME_NAME, runtime_name)
    }

    /// Adds a capability without directives.
    #[must_use]
    pub fn capability(self, namespace: impl Into<String>, attributes: Attributes) -> Self {
        self.capability_with_directives(namespace, attributes, Directives::new())
    }

    /// Adds a capability.
    #[must_use]
    pub fn capability_with_directives(
        mut self,
        namespace: impl Into<String>,
        attributes: Attributes,
        directives: Directives,
    ) -> Self {
        self.capabilities.push(PendingCapability {
            namespace: namespace.into(),
            attributes,
            directives,
            payload: None,
        });
        self
    }

    /// Adds a capability in `namespace` whose primary attribute is `value`.
    #[must_use]
    pub fn provides(self, namespace: &str, value: impl Into<AttributeValue>) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(namespace.to_string(), value.into());
        self.capability(namespace, attributes)
    }

    /// Adds a content capability with embedded bytes.
    #[must_use]
    pub fn content_bytes(mut self, bytes: impl Into<Vec<u8>>, mime: Option<&str>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let mut attributes = Attributes::new();
        attributes.insert(
            content::SIZE.into(),
            AttributeValue::from(u64::try_from(bytes.len()).unwrap_or(u64::MAX)),
        );
        if let Some(mime) = mime {
            attributes.insert(content::MIME.into(), mime.into());
        }
        self.capabilities.push(PendingCapability {
            namespace: content::NAMESPACE.into(),
            attributes,
            directives: Directives::new(),
            payload: Some(Arc::from(bytes)),
        });
        self
    }

    /// Adds a content capability pointing at `url`.
    #[must_use]
    pub fn content_url(self, url: &str, mime: Option<&str>) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(content::URL.into(), url.into());
        if let Some(mime) = mime {
            attributes.insert(content::MIME.into(), mime.into());
        }
        self.capability(content::NAMESPACE, attributes)
    }

    /// Adds a requirement.
    #[must_use]
    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Builds and adds a requirement.
    #[must_use]
    pub fn require(mut self, requirement: RequirementBuilder) -> Self {
        match requirement.build() {
            Ok(requirement) => self.requirements.push(requirement),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Adds an identity requirement on `symbolic_name` within `range`.
    #[must_use]
    pub fn require_identity(mut self, symbolic_name: &str, range: Option<&str>) -> Self {
        let range = match range.map(crate::version::VersionRange::parse).transpose() {
            Ok(range) => range,
            Err(e) => {
                self.fail(e);
                return self;
            },
        };
        match Requirement::identity(symbolic_name, range.as_ref()) {
            Ok(requirement) => self.requirements.push(requirement),
            Err(e) => self.fail(e),
        }
        self
    }

    fn fail(&mut self, error: ResourceError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Builds the resource.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded while chaining, or
    /// [`ResourceError::InvalidIdentity`] unless exactly one identity
    /// capability with a string name is present.
    pub fn build(self) -> ResourceResult<Resource> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut identities = self
            .capabilities
            .iter()
            .filter(|c| c.namespace == identity::NAMESPACE);
        let Some(identity_cap) = identities.next() else {
            return Err(ResourceError::InvalidIdentity(
                "resource has no identity capability".into(),
            ));
        };
        if identities.next().is_some() {
            return Err(ResourceError::InvalidIdentity(
                "resource has more than one identity capability".into(),
            ));
        }

        let name = identity_cap
            .attributes
            .get(identity::NAMESPACE)
            .and_then(AttributeValue::as_str)
            .ok_or_else(|| ResourceError::InvalidIdentity("identity has no name".into()))?;
        let version = match identity_cap.attributes.get(identity::VERSION) {
            None => Version::EMPTY,
            Some(AttributeValue::Version(v)) => v.clone(),
            Some(AttributeValue::String(s)) => Version::parse(s)?,
            Some(other) => {
                return Err(ResourceError::InvalidAttribute {
                    name: identity::VERSION.into(),
                    reason: format!("expected a version, found {}", other.type_name()),
                });
            },
        };
        let resource_identity = ResourceIdentity::new(name, version)?;

        let capabilities = self
            .capabilities
            .into_iter()
            .map(|pending| {
                Arc::new(Capability::new(
                    pending.namespace,
                    pending.attributes,
                    pending.directives,
                    resource_identity.clone(),
                    pending.payload,
                ))
            })
            .collect();
        let requirements = self
            .requirements
            .into_iter()
            .map(|r| Arc::new(r.with_resource(resource_identity.clone())))
            .collect();

        Ok(Resource {
            identity: resource_identity,
            capabilities,
            requirements,
        })
    }
}
