//! Capabilities and requirements.

use std::fmt;
use std::sync::Arc;

use crate::attribute::{AttributeValue, Attributes, Directives};
use crate::error::ResourceResult;
use crate::filter::Filter;
use crate::identity::ResourceIdentity;
use crate::namespace::{directive, identity};
use crate::version::VersionRange;

/// A fact a resource offers.
///
/// Capabilities are created by [`ResourceBuilder`](crate::ResourceBuilder)
/// and are immutable afterwards. The owning resource is referenced by
/// identity.
#[derive(Clone, PartialEq)]
pub struct Capability {
    namespace: String,
    attributes: Attributes,
    directives: Directives,
    resource: ResourceIdentity,
    payload: Option<Arc<[u8]>>,
}

impl Capability {
    pub(crate) fn new(
        namespace: String,
        attributes: Attributes,
        directives: Directives,
        resource: ResourceIdentity,
        payload: Option<Arc<[u8]>>,
    ) -> Self {
        Self {
            namespace,
            attributes,
            directives,
            resource,
            payload,
        }
    }

    /// Namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// All attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// A single attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// All directives.
    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// A single directive.
    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Identity of the owning resource.
    #[must_use]
    pub fn resource(&self) -> &ResourceIdentity {
        &self.resource
    }

    /// The attribute named like the namespace, used as the index key.
    #[must_use]
    pub fn primary_value(&self) -> Option<&AttributeValue> {
        self.attributes.get(&self.namespace)
    }

    /// Embedded content bytes, present only before storage relocates them.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Shared handle to the embedded content bytes.
    #[must_use]
    pub fn shared_payload(&self) -> Option<Arc<[u8]>> {
        self.payload.clone()
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("namespace", &self.namespace)
            .field("attributes", &self.attributes)
            .field("directives", &self.directives)
            .field("resource", &self.resource)
            .field("payload_len", &self.payload.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability[{}", self.namespace)?;
        for (name, value) in &self.attributes {
            write!(f, ",{name}={value}")?;
        }
        write!(f, "] of {}", self.resource)
    }
}

/// A need a resource declares, or an anonymous query.
///
/// The `filter` directive is parsed when the requirement is built, so a
/// built requirement always carries a valid filter or none.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    namespace: String,
    attributes: Attributes,
    directives: Directives,
    filter: Option<Filter>,
    resource: Option<ResourceIdentity>,
}

impl Requirement {
    /// Starts building a requirement in `namespace`.
    #[must_use]
    pub fn builder(namespace: impl Into<String>) -> RequirementBuilder {
        RequirementBuilder::new(namespace)
    }

    /// A requirement on the identity namespace for `symbolic_name`, limited
    /// to `range` when given.
    ///
    /// # Errors
    ///
    /// Never fails for well-formed names; the signature mirrors
    /// [`RequirementBuilder::build`].
    pub fn identity(symbolic_name: &str, range: Option<&VersionRange>) -> ResourceResult<Self> {
        let name_filter = Filter::equal(identity::NAMESPACE, symbolic_name).to_string();
        let filter = match range {
            Some(range) => format!("(&{name_filter}{})", range.to_filter(identity::VERSION)),
            None => name_filter,
        };
        Self::builder(identity::NAMESPACE)
            .attribute(identity::NAMESPACE, symbolic_name)
            .filter(filter)
            .build()
    }

    /// A requirement in `namespace` keyed by its primary value, without a
    /// filter.
    ///
    /// # Errors
    ///
    /// Never fails; the signature mirrors [`RequirementBuilder::build`].
    pub fn generic(
        namespace: impl Into<String>,
        primary_value: impl Into<AttributeValue>,
    ) -> ResourceResult<Self> {
        let namespace = namespace.into();
        Self::builder(namespace.clone())
            .attribute(namespace, primary_value)
            .build()
    }

    /// Namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// All attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// A single attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// All directives.
    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// A single directive.
    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Parsed filter, if the requirement has one.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Identity of the requiring resource; `None` for anonymous queries.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceIdentity> {
        self.resource.as_ref()
    }

    /// The attribute named like the namespace. `None` makes the requirement a
    /// namespace-wide query.
    #[must_use]
    pub fn primary_value(&self) -> Option<&AttributeValue> {
        self.attributes.get(&self.namespace)
    }

    /// Whether the requirement may stay unsatisfied.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.directive(directive::RESOLUTION) == Some(directive::RESOLUTION_OPTIONAL)
    }

    pub(crate) fn with_resource(mut self, resource: ResourceIdentity) -> Self {
        self.resource = Some(resource);
        self
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Requirement[{}", self.namespace)?;
        for (name, value) in &self.attributes {
            write!(f, ",{name}={value}")?;
        }
        if let Some(filter) = &self.filter {
            write!(f, ",filter={filter}")?;
        }
        f.write_str("]")?;
        if let Some(resource) = &self.resource {
            write!(f, " of {resource}")?;
        }
        Ok(())
    }
}

/// Builder for [`Requirement`].
#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    namespace: String,
    attributes: Attributes,
    directives: Directives,
}

impl RequirementBuilder {
    /// Creates a builder for `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: Attributes::new(),
            directives: Directives::new(),
        }
    }

    /// Sets an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Replaces all attributes.
    #[must_use]
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets a directive.
    #[must_use]
    pub fn directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(name.into(), value.into());
        self
    }

    /// Replaces all directives.
    #[must_use]
    pub fn directives(mut self, directives: Directives) -> Self {
        self.directives = directives;
        self
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn filter(self, filter: impl Into<String>) -> Self {
        self.directive(directive::FILTER, filter)
    }

    /// Marks the requirement optional.
    #[must_use]
    pub fn optional(self) -> Self {
        self.directive(directive::RESOLUTION, directive::RESOLUTION_OPTIONAL)
    }

    /// Builds the requirement, parsing its filter directive.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidFilter`](crate::ResourceError::InvalidFilter)
    /// if the filter directive does not parse.
    pub fn build(self) -> ResourceResult<Requirement> {
        let filter = self
            .directives
            .get(directive::FILTER)
            .map(String::as_str)
            .map(Filter::parse)
            .transpose()?;
        Ok(Requirement {
            namespace: self.namespace,
            attributes: self.attributes,
            directives: self.directives,
            filter,
            resource: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    #[test]
    fn test_identity_requirement_emits_filter() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        let req = Requirement::identity("alpha", Some(&range)).unwrap();
        assert_eq!(req.namespace(), "identity");
        assert_eq!(req.primary_value().and_then(AttributeValue::as_str), Some("alpha"));
        assert_eq!(
            req.directive("filter"),
            Some("(&(identity=alpha)(&(version>=1.0.0)(!(version>=2.0.0))))")
        );

        let mut attrs = Attributes::new();
        attrs.insert("identity".into(), "alpha".into());
        attrs.insert("version".into(), Version::new(1, 5, 0).into());
        assert!(req.filter().unwrap().matches(&attrs));
        attrs.insert("version".into(), Version::new(2, 0, 0).into());
        assert!(!req.filter().unwrap().matches(&attrs));
    }

    #[test]
    fn test_invalid_filter_rejected_at_build() {
        let result = Requirement::builder("svc").filter("(svc=").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_optional_directive() {
        let req = Requirement::builder("svc").optional().build().unwrap();
        assert!(req.is_optional());
        assert!(req.resource().is_none());
        let req = Requirement::generic("svc", "X").unwrap();
        assert!(!req.is_optional());
        assert!(req.filter().is_none());
    }
}
