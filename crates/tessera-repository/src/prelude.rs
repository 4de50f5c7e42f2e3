//! Common imports for working with the repository.
//!
//! ```
//! use tessera_repository::prelude::*;
//! ```

pub use crate::{
    CatalogCodec, ContentReader, DigestAlgorithm, PersistentRepository, RepositoryConfig,
    RepositoryError, RepositoryResult,
};
