//! Common imports for working with resources.
//!
//! ```
//! use tessera_resource::prelude::*;
//! ```

pub use crate::{
    AttributeValue, Attributes, Capability, DefaultMatchPolicy, Directives, Filter, MatchPolicy,
    Requirement, RequirementBuilder, Resource, ResourceBuilder, ResourceError, ResourceIdentity,
    ResourceIndex, ResourceResult, ResourceStore, Version, VersionRange, Wire,
};
