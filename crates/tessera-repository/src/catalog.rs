//! Catalog schema and codecs.
//!
//! The catalog lists every stored resource with its capabilities and
//! requirements as namespace plus typed attributes and directives, together
//! with the repository name and the generation counter. The concrete encoding
//! is left to a [`CatalogCodec`]; [`JsonCatalogCodec`] is the default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_resource::{
    AttributeValue, Attributes, Capability, Requirement, Resource, ResourceResult,
};

use crate::digest::DigestAlgorithm;

/// Root of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Repository name.
    pub name: String,
    /// Generation counter, incremented on every add and remove.
    pub increment: u64,
    /// Algorithm used for content digests.
    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,
    /// Stored resources in insertion order.
    #[serde(default)]
    pub resources: Vec<CatalogResource>,
}

/// One stored resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResource {
    /// Capabilities in insertion order.
    pub capabilities: Vec<CatalogEntry>,
    /// Requirements in insertion order.
    #[serde(default)]
    pub requirements: Vec<CatalogEntry>,
}

/// A capability or requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Namespace.
    pub namespace: String,
    /// Typed attributes.
    #[serde(default)]
    pub attributes: Vec<CatalogAttribute>,
    /// Directives.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub directives: BTreeMap<String, String>,
}

/// A typed attribute as `name`, string `value` and `type` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAttribute {
    /// Attribute name.
    pub name: String,
    /// String form of the value.
    pub value: String,
    /// Type name, e.g. `String`, `Long` or `List<Version>`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl CatalogEntry {
    fn from_parts(namespace: &str, attributes: &Attributes, directives: &BTreeMap<String, String>) -> Self {
        Self {
            namespace: namespace.to_string(),
            attributes: attributes
                .iter()
                .map(|(name, value)| CatalogAttribute {
                    name: name.clone(),
                    value: value.value_string(),
                    kind: value.type_name(),
                })
                .collect(),
            directives: directives.clone(),
        }
    }

    fn from_capability(capability: &Capability) -> Self {
        Self::from_parts(
            capability.namespace(),
            capability.attributes(),
            capability.directives(),
        )
    }

    fn from_requirement(requirement: &Requirement) -> Self {
        Self::from_parts(
            requirement.namespace(),
            requirement.attributes(),
            requirement.directives(),
        )
    }

    fn typed_attributes(&self) -> ResourceResult<Attributes> {
        self.attributes
            .iter()
            .map(|a| Ok((a.name.clone(), AttributeValue::parse(&a.kind, &a.value)?)))
            .collect()
    }
}

impl CatalogResource {
    /// Catalog form of `resource`. Embedded payloads are not recorded.
    #[must_use]
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            capabilities: resource
                .capabilities()
                .iter()
                .map(|c| CatalogEntry::from_capability(c))
                .collect(),
            requirements: resource
                .requirements()
                .iter()
                .map(|r| CatalogEntry::from_requirement(r))
                .collect(),
        }
    }

    /// Rebuild the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if an attribute does not parse as its recorded type,
    /// a filter is malformed, or the identity capability is missing.
    pub fn to_resource(&self) -> ResourceResult<Resource> {
        let mut builder = Resource::builder();
        for entry in &self.capabilities {
            builder = builder.capability_with_directives(
                entry.namespace.clone(),
                entry.typed_attributes()?,
                entry.directives.clone(),
            );
        }
        for entry in &self.requirements {
            let requirement = Requirement::builder(entry.namespace.clone())
                .attributes(entry.typed_attributes()?)
                .directives(entry.directives.clone())
                .build()?;
            builder = builder.requirement(requirement);
        }
        builder.build()
    }
}

/// Encodes and decodes the catalog.
pub trait CatalogCodec: Send + Sync {
    /// Codec name, used in logs.
    fn name(&self) -> &str;

    /// Serialize a catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be encoded.
    fn encode(&self, catalog: &CatalogDocument) -> anyhow::Result<Vec<u8>>;

    /// Deserialize a catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid catalog.
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<CatalogDocument>;
}

/// Pretty-printed JSON catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCatalogCodec;

impl CatalogCodec for JsonCatalogCodec {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "json"
    }

    fn encode(&self, catalog: &CatalogDocument) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(catalog)?)
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<CatalogDocument> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
