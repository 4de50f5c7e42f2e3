//! Well-known namespaces, attribute names and directive names.

/// The identity namespace. Every resource carries exactly one capability here.
pub mod identity {
    /// Namespace name. Also the primary attribute holding the symbolic name.
    pub const NAMESPACE: &str = "identity";
    /// Version attribute.
    pub const VERSION: &str = "version";
    /// Resource type attribute.
    pub const TYPE: &str = "type";
    /// Name of the runtime that should host the resource.
    pub const RUNTIME_NAME: &str = "runtime.name";
    /// Name of the activator a module starts with.
    pub const ACTIVATOR: &str = "module.activator";

    /// Resource type for runtime modules.
    pub const TYPE_MODULE: &str = "module";
    /// Resource type for plain resources.
    pub const TYPE_UNKNOWN: &str = "unknown";
}

/// The content namespace. Capabilities here describe a stored blob.
pub mod content {
    /// Namespace name. Also the primary attribute holding the content digest.
    pub const NAMESPACE: &str = "content";
    /// Location of the content.
    pub const URL: &str = "url";
    /// Content size in bytes.
    pub const SIZE: &str = "size";
    /// Media type of the content.
    pub const MIME: &str = "mime";
}

/// Directive names.
pub mod directive {
    /// Filter expression a requirement is matched with.
    pub const FILTER: &str = "filter";
    /// Resolution mode, either `mandatory` or `optional`.
    pub const RESOLUTION: &str = "resolution";
    /// Value of [`RESOLUTION`] marking an optional requirement.
    pub const RESOLUTION_OPTIONAL: &str = "optional";
    /// Value of [`RESOLUTION`] marking a mandatory requirement.
    pub const RESOLUTION_MANDATORY: &str = "mandatory";
}
