//! Repository error types.

use std::path::PathBuf;

use tessera_resource::ResourceError;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The resource model rejected the operation, e.g. a duplicate identity.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Reading or writing the storage directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes do not hash to the recorded digest.
    #[error("digest mismatch for {path}: expected {expected}, found {actual}")]
    DigestMismatch {
        /// Blob location.
        path: PathBuf,
        /// Digest recorded in the catalog.
        expected: String,
        /// Digest of the bytes on disk.
        actual: String,
    },

    /// Content could not be found or read.
    #[error("missing content: {0}")]
    MissingContent(String),

    /// The catalog could not be encoded, decoded or replaced.
    #[error("catalog error at {path}: {message}")]
    Catalog {
        /// Catalog file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Another repository instance holds the storage directory.
    #[error("repository at {path} is locked by another instance")]
    Locked {
        /// Storage directory.
        path: PathBuf,
    },
}

impl RepositoryError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
