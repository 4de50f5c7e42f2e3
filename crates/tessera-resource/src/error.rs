//! Resource model error types.

use thiserror::Error;

use crate::identity::ResourceIdentity;

/// Errors raised by the capability model and the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// A resource with the same identity is already present in the store.
    #[error("resource already added: {0}")]
    DuplicateIdentity(ResourceIdentity),

    /// A version string could not be parsed.
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A version range string could not be parsed.
    #[error("invalid version range '{input}': {reason}")]
    InvalidVersionRange {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A filter expression could not be parsed.
    #[error("invalid filter '{input}' at offset {offset}: {reason}")]
    InvalidFilter {
        /// The offending filter expression.
        input: String,
        /// Character offset where parsing failed.
        offset: usize,
        /// Why it was rejected.
        reason: String,
    },

    /// A typed attribute value could not be decoded.
    #[error("invalid attribute '{name}': {reason}")]
    InvalidAttribute {
        /// Attribute name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The resource has no identity capability, or more than one.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// A wire references a capability or requirement its endpoints do not declare.
    #[error("invalid wire: {0}")]
    InvalidWire(String),
}

/// Result type for resource model operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
