//! Tessera Repository - persistent, content-addressed resource storage.
//!
//! This crate provides:
//! - `PersistentRepository`, a resource store that survives restarts
//! - Content addressing with SHA-256, SHA-512 or BLAKE3 digests
//! - A typed catalog format behind the `CatalogCodec` trait
//! - Pluggable content retrieval through `ContentReader`
//!
//! # Layout
//!
//! ```text
//! <storage_dir>/
//!   .lock                      exclusive lock held while open
//!   repository.json            catalog, replaced atomically
//!   ba/7816bf.../content       blob addressed by its digest
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_repository::prelude::*;
//! use tessera_resource::{Resource, Version};
//!
//! # fn example() -> RepositoryResult<()> {
//! let repository = PersistentRepository::open(RepositoryConfig::new("/var/lib/tessera"))?;
//! let stored = repository.add_resource(
//!     Resource::builder()
//!         .identity("alpha", Version::new(1, 0, 0))
//!         .content_bytes(b"module bytes".to_vec(), None)
//!         .build()?,
//! )?;
//! let content = stored.content_capabilities().next().unwrap();
//! let _reader = repository.open_content(content)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod catalog;
mod content;
mod digest;
mod error;
mod repository;

pub use catalog::{
    CatalogAttribute, CatalogCodec, CatalogDocument, CatalogEntry, CatalogResource,
    JsonCatalogCodec,
};
pub use content::{ContentReader, DefaultContentReader};
pub use digest::{ContentHasher, DigestAlgorithm};
pub use error::{RepositoryError, RepositoryResult};
pub use repository::{DEFAULT_CATALOG_FILE, LOCK_FILE, PersistentRepository, RepositoryConfig};
