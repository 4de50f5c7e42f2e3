//! Resource fixtures.

use tessera_resource::{Requirement, Resource, Version};

/// Namespace used by the service fixtures.
pub const SERVICE_NAMESPACE: &str = "service";

/// Parse a version, panicking on malformed test input.
#[must_use]
pub fn version(text: &str) -> Version {
    Version::parse(text).expect("fixture version")
}

/// A resource providing `service` and requiring each of `requires`.
#[must_use]
pub fn service_module(name: &str, version_text: &str, service: &str, requires: &[&str]) -> Resource {
    service_builder(name, version_text, service, requires)
        .build()
        .expect("fixture resource")
}

/// Like [`service_module`], with an activator name and in-memory content.
#[must_use]
pub fn content_module(
    name: &str,
    version_text: &str,
    service: &str,
    activator: &str,
    content: &[u8],
) -> Resource {
    service_builder(name, version_text, service, &[])
        .activator(activator)
        .content_bytes(content.to_vec(), Some("application/octet-stream"))
        .build()
        .expect("fixture resource")
}

fn service_builder(
    name: &str,
    version_text: &str,
    service: &str,
    requires: &[&str],
) -> tessera_resource::ResourceBuilder {
    let mut builder = Resource::builder()
        .identity(name, version(version_text))
        .provides(SERVICE_NAMESPACE, service);
    for required in requires {
        builder = builder.require(
            Requirement::builder(SERVICE_NAMESPACE)
                .filter(format!("({SERVICE_NAMESPACE}={required})")),
        );
    }
    builder
}

/// A top-level requirement for `service`.
#[must_use]
pub fn service_requirement(service: &str) -> Requirement {
    Requirement::generic(SERVICE_NAMESPACE, service).expect("fixture requirement")
}
