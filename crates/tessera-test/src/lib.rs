//! Tessera Test - shared test utilities for the Tessera runtime.
//!
//! Resource fixtures, recording listeners, activators and installers, and
//! a harness that wires a temporary repository to a runtime.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tessera-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use tessera_test::{TestHost, service_module};
//!
//! #[tokio::test]
//! async fn test_provision() {
//!     let host = TestHost::new();
//!     host.repository().add_resource(service_module("log", "1.0.0", "log", &[])).unwrap();
//!     host.provision(&[tessera_test::service_requirement("log")]).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![allow(clippy::missing_panics_doc)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
