//! Tessera Resource - capability model and resource index for the Tessera
//! module runtime.
//!
//! This crate provides:
//! - Versions, version ranges and resource identities
//! - Typed attributes and LDAP-style filter expressions
//! - Immutable resources built from capabilities and requirements
//! - The match policy deciding whether a capability satisfies a requirement
//! - A thread-safe resource store with a capability index
//! - Wires recording resolved dependency edges
//!
//! # Example
//!
//! ```rust
//! use tessera_resource::prelude::*;
//!
//! let store = ResourceStore::new("example");
//! store
//!     .add_resource(
//!         Resource::builder()
//!             .identity("alpha", Version::new(1, 0, 0))
//!             .provides("svc", "X")
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let wanted = Requirement::builder("svc").filter("svc=X").build().unwrap();
//! let providers = store.find_providers(&wanted);
//! assert_eq!(providers[0].resource().symbolic_name(), "alpha");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod attribute;
mod capability;
mod error;
mod filter;
mod identity;
pub mod namespace;
mod policy;
mod resource;
mod store;
mod version;
mod wire;

pub use attribute::{AttributeValue, Attributes, Directives};
pub use capability::{Capability, Requirement, RequirementBuilder};
pub use error::{ResourceError, ResourceResult};
pub use filter::{CompareOp, Filter};
pub use identity::ResourceIdentity;
pub use policy::{DefaultMatchPolicy, MatchPolicy};
pub use resource::{Resource, ResourceBuilder};
pub use store::{RemovedResource, ResourceIndex, ResourceStore};
pub use version::{Version, VersionRange};
pub use wire::Wire;
