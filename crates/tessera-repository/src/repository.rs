//! Persistent, content-addressed repository.

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use fs2::FileExt;
use tessera_resource::namespace::content;
use tessera_resource::{
    AttributeValue, Attributes, Capability, Requirement, Resource, ResourceError,
    ResourceIdentity, ResourceIndex, ResourceStore,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{CatalogCodec, CatalogDocument, CatalogResource, JsonCatalogCodec};
use crate::content::{ContentReader, DefaultContentReader};
use crate::digest::DigestAlgorithm;
use crate::error::{RepositoryError, RepositoryResult};

/// Default catalog file name.
pub const DEFAULT_CATALOG_FILE: &str = "repository.json";

/// Name of the lock file inside the storage directory.
pub const LOCK_FILE: &str = ".lock";

/// Name of a blob file inside its digest directory.
const BLOB_FILE: &str = "content";

const COPY_BUFFER_SIZE: usize = 65_536;

/// Repository settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Repository name, recorded in the catalog.
    pub name: String,
    /// Root of the catalog and the blobs.
    pub storage_dir: PathBuf,
    /// Catalog file name inside `storage_dir`.
    pub catalog_file: String,
    /// Digest algorithm for new content.
    pub digest_algorithm: DigestAlgorithm,
}

impl RepositoryConfig {
    /// Settings for `storage_dir` with default name, catalog file and digest.
    #[must_use]
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "repository".into(),
            storage_dir: storage_dir.into(),
            catalog_file: DEFAULT_CATALOG_FILE.into(),
            digest_algorithm: DigestAlgorithm::default(),
        }
    }

    /// Set the repository name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the catalog file name.
    #[must_use]
    pub fn with_catalog_file(mut self, catalog_file: impl Into<String>) -> Self {
        self.catalog_file = catalog_file.into();
        self
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }
}

/// Exclusive advisory lock on the storage directory, released on drop.
#[derive(Debug)]
struct StorageLock {
    file: std::fs::File,
}

impl StorageLock {
    fn acquire(storage_dir: &Path) -> RepositoryResult<Self> {
        let path = storage_dir.join(LOCK_FILE);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&path)
            .map_err(RepositoryError::io(&path))?;
        file.try_lock_exclusive()
            .map_err(|_| RepositoryError::Locked {
                path: storage_dir.to_path_buf(),
            })?;
        Ok(Self { file })
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// A blob written (or found) while adding a resource.
struct StoredBlob {
    digest: String,
    size: u64,
    path: PathBuf,
    created: bool,
}

/// A [`ResourceStore`] whose entries survive restarts.
///
/// Content payloads are stored once per digest under
/// `<storage_dir>/<digest[0..2]>/<digest[2..]>/content`. The catalog is
/// rewritten atomically on every add and remove before the call returns.
pub struct PersistentRepository {
    config: RepositoryConfig,
    catalog_path: PathBuf,
    store: ResourceStore,
    codec: Arc<dyn CatalogCodec>,
    reader: Arc<dyn ContentReader>,
    generation: AtomicU64,
    write_lock: Mutex<()>,
    _lock: StorageLock,
}

impl std::fmt::Debug for PersistentRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentRepository")
            .field("name", &self.config.name)
            .field("storage_dir", &self.config.storage_dir)
            .field("codec", &self.codec.name())
            .field("resources", &self.store.len())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl PersistentRepository {
    /// Open the repository with the JSON codec and the default content reader.
    ///
    /// # Errors
    ///
    /// See [`open_with`](Self::open_with).
    pub fn open(config: RepositoryConfig) -> RepositoryResult<Self> {
        Self::open_with(
            config,
            Arc::new(JsonCatalogCodec),
            Arc::new(DefaultContentReader),
        )
    }

    /// Open the repository, creating the storage directory if needed and
    /// replaying an existing catalog. The catalog is not rewritten.
    ///
    /// When a catalog exists, its digest algorithm takes precedence over the
    /// configured one.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Locked`] if another instance holds the
    /// storage directory, [`RepositoryError::Catalog`] if the catalog cannot be
    /// decoded or replayed, or [`RepositoryError::Io`] on filesystem errors.
    pub fn open_with(
        mut config: RepositoryConfig,
        codec: Arc<dyn CatalogCodec>,
        reader: Arc<dyn ContentReader>,
    ) -> RepositoryResult<Self> {
        std::fs::create_dir_all(&config.storage_dir)
            .map_err(RepositoryError::io(&config.storage_dir))?;
        config.storage_dir = config
            .storage_dir
            .canonicalize()
            .map_err(RepositoryError::io(&config.storage_dir))?;

        let lock = StorageLock::acquire(&config.storage_dir)?;
        let catalog_path = config.storage_dir.join(&config.catalog_file);
        let store = ResourceStore::new(config.name.clone());

        let mut generation = 0;
        if catalog_path.exists() {
            let bytes = std::fs::read(&catalog_path).map_err(RepositoryError::io(&catalog_path))?;
            let document = codec.decode(&bytes).map_err(|e| RepositoryError::Catalog {
                path: catalog_path.clone(),
                message: format!("failed to decode catalog: {e:#}"),
            })?;

            if document.digest_algorithm != config.digest_algorithm {
                warn!(
                    configured = %config.digest_algorithm,
                    catalog = %document.digest_algorithm,
                    "Catalog digest algorithm differs from configuration, using catalog"
                );
                config.digest_algorithm = document.digest_algorithm;
            }

            for entry in &document.resources {
                let replay = entry
                    .to_resource()
                    .and_then(|resource| store.add_resource(resource));
                if let Err(e) = replay {
                    return Err(RepositoryError::Catalog {
                        path: catalog_path,
                        message: format!("failed to replay resource: {e}"),
                    });
                }
            }
            generation = document.increment;
        }

        info!(
            repository = %config.name,
            storage_dir = %config.storage_dir.display(),
            resources = store.len(),
            generation,
            codec = codec.name(),
            "Repository opened"
        );

        Ok(Self {
            config,
            catalog_path,
            store,
            codec,
            reader,
            generation: AtomicU64::new(generation),
            write_lock: Mutex::new(()),
            _lock: lock,
        })
    }

    /// Effective settings.
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Canonical storage directory.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    /// Catalog file location.
    #[must_use]
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// Current generation. Changes on every successful add and remove.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of stored resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Blob location for `digest`.
    #[must_use]
    pub fn blob_path(&self, digest: &str) -> PathBuf {
        let (head, tail) = digest.split_at(digest.len().min(2));
        self.config.storage_dir.join(head).join(tail).join(BLOB_FILE)
    }

    /// Store a resource, copying its content into the repository.
    ///
    /// Content whose URL already points into the storage directory is kept
    /// as is. Other content is hashed while it is copied, stored under its
    /// digest, and the content capability is rewritten with `content`
    /// (digest), `url` and `size`. The catalog is written before this
    /// returns; if that fails the store and the blobs are rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Resource`] wrapping
    /// [`ResourceError::DuplicateIdentity`] if the identity is already stored,
    /// [`RepositoryError::MissingContent`] if content cannot be read,
    /// [`RepositoryError::DigestMismatch`] if content does not match a
    /// declared digest, or a storage error if writing fails.
    pub fn add_resource(&self, resource: Resource) -> RepositoryResult<Arc<Resource>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let identity = resource.identity().clone();
        if self.store.contains(&identity) {
            return Err(ResourceError::DuplicateIdentity(identity).into());
        }

        let mut blobs: Vec<StoredBlob> = Vec::new();
        let mut replacements: Vec<Option<Attributes>> = Vec::new();
        for capability in resource.capabilities() {
            if capability.namespace() != content::NAMESPACE || self.is_stored(capability) {
                replacements.push(None);
                continue;
            }
            let blob = match self.store_content(capability) {
                Ok(blob) => blob,
                Err(e) => {
                    self.discard_blobs(&blobs);
                    return Err(e);
                },
            };
            replacements.push(Some(self.relocated_attributes(capability, &blob)));
            blobs.push(blob);
        }

        let mut replacements = replacements.into_iter();
        let relocated = resource
            .rewrite_capabilities(|_| replacements.next().flatten())
            .and_then(|relocated| self.store.add_resource(relocated));
        let stored = match relocated {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_blobs(&blobs);
                return Err(e.into());
            },
        };

        let next = self.generation().wrapping_add(1);
        if let Err(e) = self.write_catalog(next) {
            self.store.remove_resource(&identity);
            self.discard_blobs(&blobs);
            return Err(e);
        }
        self.generation.store(next, Ordering::SeqCst);

        info!(
            repository = %self.config.name,
            identity = %identity,
            blobs = blobs.len(),
            generation = next,
            "Resource stored"
        );
        Ok(stored)
    }

    /// Remove a resource. Returns `None` if it is not stored.
    ///
    /// Blobs no other resource references are deleted after the catalog has
    /// been written.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be written; the resource
    /// stays in the repository in that case.
    pub fn remove_resource(
        &self,
        identity: &ResourceIdentity,
    ) -> RepositoryResult<Option<Arc<Resource>>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(taken) = self.store.take_resource(identity) else {
            return Ok(None);
        };

        let next = self.generation().wrapping_add(1);
        if let Err(e) = self.write_catalog(next) {
            if let Err(restore) = self.store.restore_resource(taken) {
                warn!(identity = %identity, error = %restore, "Failed to restore resource after catalog error");
            }
            return Err(e);
        }
        let removed = taken.into_resource();
        self.generation.store(next, Ordering::SeqCst);

        for capability in removed.content_capabilities() {
            let Some(digest) = content_digest(capability) else {
                continue;
            };
            if self.is_referenced(digest) {
                continue;
            }
            self.delete_blob(digest);
        }

        info!(
            repository = %self.config.name,
            identity = %identity,
            generation = next,
            "Resource removed"
        );
        Ok(Some(removed))
    }

    /// Open a verified reader over stored content.
    ///
    /// The blob is hashed before the reader is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingContent`] if the capability has no
    /// digest or its blob is absent, and [`RepositoryError::DigestMismatch`]
    /// if the blob is corrupt.
    pub fn open_content(&self, capability: &Capability) -> RepositoryResult<BufReader<std::fs::File>> {
        let digest = content_digest(capability)
            .ok_or_else(|| RepositoryError::MissingContent(format!("{capability} has no digest")))?;
        let path = self.blob_path(digest);
        if !path.is_file() {
            return Err(RepositoryError::MissingContent(format!(
                "blob {digest} not found at {}",
                path.display()
            )));
        }

        let mut file = std::fs::File::open(&path).map_err(RepositoryError::io(&path))?;
        let mut hasher = self.config.digest_algorithm.hasher();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let read = file.read(&mut buffer).map_err(RepositoryError::io(&path))?;
            if read == 0 {
                break;
            }
            hasher.update(buffer.get(..read).unwrap_or_default());
        }
        let actual = hasher.finalize_hex();
        if actual != digest {
            return Err(RepositoryError::DigestMismatch {
                path,
                expected: digest.to_string(),
                actual,
            });
        }

        let file = std::fs::File::open(&path).map_err(RepositoryError::io(&path))?;
        Ok(BufReader::new(file))
    }

    /// Whether `capability` already refers to a blob in this repository.
    fn is_stored(&self, capability: &Capability) -> bool {
        let Some(digest) = content_digest(capability) else {
            return false;
        };
        let Some(path) = capability
            .attribute(content::URL)
            .and_then(AttributeValue::as_str)
            .and_then(DefaultContentReader::resolve_path)
        else {
            return false;
        };
        path.canonicalize()
            .is_ok_and(|p| p.starts_with(&self.config.storage_dir) && p == self.blob_path(digest))
    }

    /// Whether any stored resource still references `digest`.
    fn is_referenced(&self, digest: &str) -> bool {
        Requirement::generic(content::NAMESPACE, digest)
            .map(|query| !self.store.find_providers(&query).is_empty())
            .unwrap_or(true)
    }

    fn store_content(&self, capability: &Capability) -> RepositoryResult<StoredBlob> {
        let mut source = self
            .reader
            .open(capability)
            .map_err(|e| RepositoryError::MissingContent(format!("{capability}: {e:#}")))?;

        let storage_dir = &self.config.storage_dir;
        let mut temp = tempfile::NamedTempFile::new_in(storage_dir)
            .map_err(RepositoryError::io(storage_dir))?;
        let mut hasher = self.config.digest_algorithm.hasher();
        let mut size: u64 = 0;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let read = source
                .read(&mut buffer)
                .map_err(|e| RepositoryError::MissingContent(format!("{capability}: {e}")))?;
            if read == 0 {
                break;
            }
            let chunk = buffer.get(..read).unwrap_or_default();
            hasher.update(chunk);
            temp.write_all(chunk).map_err(RepositoryError::io(temp.path()))?;
            size = size.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
        }
        temp.as_file()
            .sync_all()
            .map_err(RepositoryError::io(temp.path()))?;

        let digest = hasher.finalize_hex();
        if let Some(declared) = content_digest(capability)
            && declared != digest
        {
            return Err(RepositoryError::DigestMismatch {
                path: temp.path().to_path_buf(),
                expected: declared.to_string(),
                actual: digest,
            });
        }

        let path = self.blob_path(&digest);
        if path.is_file() {
            debug!(digest = %digest, "Content already stored");
            return Ok(StoredBlob {
                digest,
                size,
                path,
                created: false,
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RepositoryError::io(parent))?;
        }
        temp.persist(&path)
            .map_err(|e| RepositoryError::io(&path)(e.error))?;
        debug!(digest = %digest, size, path = %path.display(), "Content stored");

        Ok(StoredBlob {
            digest,
            size,
            path,
            created: true,
        })
    }

    fn relocated_attributes(&self, capability: &Capability, blob: &StoredBlob) -> Attributes {
        let url = Url::from_file_path(&blob.path)
            .map_or_else(|()| blob.path.display().to_string(), |url| url.to_string());
        let mut attributes = capability.attributes().clone();
        attributes.insert(content::NAMESPACE.into(), blob.digest.clone().into());
        attributes.insert(content::URL.into(), url.into());
        attributes.insert(content::SIZE.into(), blob.size.into());
        attributes
    }

    fn discard_blobs(&self, blobs: &[StoredBlob]) {
        for blob in blobs.iter().filter(|b| b.created) {
            self.delete_blob(&blob.digest);
        }
    }

    fn delete_blob(&self, digest: &str) {
        let path = self.blob_path(digest);
        let Some(digest_dir) = path.parent() else {
            return;
        };
        if let Err(e) = std::fs::remove_dir_all(digest_dir) {
            warn!(digest = %digest, error = %e, "Failed to delete blob");
            return;
        }
        // The two-character fan-out directory goes once it is empty.
        if let Some(fan_out) = digest_dir.parent() {
            let _ = std::fs::remove_dir(fan_out);
        }
        debug!(digest = %digest, "Blob deleted");
    }

    fn write_catalog(&self, generation: u64) -> RepositoryResult<()> {
        let document = CatalogDocument {
            name: self.config.name.clone(),
            increment: generation,
            digest_algorithm: self.config.digest_algorithm,
            resources: self
                .store
                .resources()
                .iter()
                .map(|r| CatalogResource::from_resource(r))
                .collect(),
        };
        let catalog_error = |message: String| RepositoryError::Catalog {
            path: self.catalog_path.clone(),
            message,
        };

        let bytes = self
            .codec
            .encode(&document)
            .map_err(|e| catalog_error(format!("failed to encode catalog: {e:#}")))?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.config.storage_dir)
            .map_err(|e| catalog_error(format!("failed to create temp file for atomic write: {e}")))?;
        temp.write_all(&bytes)
            .map_err(|e| catalog_error(format!("failed to write temp catalog: {e}")))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| catalog_error(format!("failed to sync temp catalog to disk: {e}")))?;
        temp.persist(&self.catalog_path)
            .map_err(|e| catalog_error(format!("failed to atomically replace catalog: {e}")))?;

        debug!(
            path = %self.catalog_path.display(),
            resources = document.resources.len(),
            generation,
            "Catalog written"
        );
        Ok(())
    }
}

fn content_digest(capability: &Capability) -> Option<&str> {
    capability
        .attribute(content::NAMESPACE)
        .and_then(AttributeValue::as_str)
}

impl ResourceIndex for PersistentRepository {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn get_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>> {
        self.store.get_resource(identity)
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<Capability>> {
        self.store.find_providers(requirement)
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        self.store.resources()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_resource::Version;

    fn open(dir: &Path) -> PersistentRepository {
        PersistentRepository::open(RepositoryConfig::new(dir)).unwrap()
    }

    fn with_bytes(name: &str, bytes: &[u8]) -> Resource {
        Resource::builder()
            .identity(name, Version::new(1, 0, 0))
            .content_bytes(bytes.to_vec(), Some("application/octet-stream"))
            .build()
            .unwrap()
    }

    fn read(repo: &PersistentRepository, capability: &Capability) -> Vec<u8> {
        let mut out = Vec::new();
        repo.open_content(capability)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_open_empty_does_not_write_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        assert!(repo.is_empty());
        assert_eq!(repo.generation(), 0);
        assert!(!repo.catalog_path().exists());
    }

    #[test]
    fn test_add_relocates_content() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let stored = repo.add_resource(with_bytes("alpha", b"abc")).unwrap();

        let cap = stored.content_capabilities().next().unwrap();
        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(cap.attribute("content").and_then(AttributeValue::as_str), Some(digest));
        assert_eq!(cap.attribute("size"), Some(&AttributeValue::Long(3)));
        assert_eq!(
            cap.attribute("mime").and_then(AttributeValue::as_str),
            Some("application/octet-stream")
        );
        assert!(cap.payload().is_none());

        let blob = repo.storage_dir().join("ba").join(&digest[2..]).join("content");
        assert!(blob.is_file());
        assert_eq!(read(&repo, cap), b"abc");
        assert_eq!(repo.generation(), 1);
        assert!(repo.catalog_path().is_file());
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        repo.add_resource(with_bytes("alpha", b"one")).unwrap();
        let err = repo.add_resource(with_bytes("alpha", b"two")).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Resource(ResourceError::DuplicateIdentity(_))
        ));
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.generation(), 1);
    }

    #[test]
    fn test_identical_content_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let a = repo.add_resource(with_bytes("a", b"same bytes")).unwrap();
        let b = repo.add_resource(with_bytes("b", b"same bytes")).unwrap();

        let cap_a = a.content_capabilities().next().unwrap();
        let cap_b = b.content_capabilities().next().unwrap();
        assert_eq!(cap_a.attribute("content"), cap_b.attribute("content"));
        assert_eq!(read(&repo, cap_a), b"same bytes");
        assert_eq!(read(&repo, cap_b), b"same bytes");

        let fan_out_dirs = std::fs::read_dir(repo.storage_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .count();
        assert_eq!(fan_out_dirs, 1);
    }

    #[test]
    fn test_shared_blob_survives_until_last_reference_removed() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let a = repo.add_resource(with_bytes("a", b"shared")).unwrap();
        let b = repo.add_resource(with_bytes("b", b"shared")).unwrap();
        let digest = content_digest(a.content_capabilities().next().unwrap())
            .unwrap()
            .to_string();

        repo.remove_resource(a.identity()).unwrap().unwrap();
        assert!(repo.blob_path(&digest).is_file());
        assert_eq!(read(&repo, b.content_capabilities().next().unwrap()), b"shared");

        repo.remove_resource(b.identity()).unwrap().unwrap();
        assert!(!repo.blob_path(&digest).exists());
        assert!(repo.remove_resource(b.identity()).unwrap().is_none());
        assert_eq!(repo.generation(), 4);
    }

    #[test]
    fn test_reopen_restores_resources_and_generation() {
        let dir = tempfile::tempdir().unwrap();
        let identity = {
            let repo = open(dir.path());
            repo.add_resource(with_bytes("a", b"one")).unwrap();
            let b = repo
                .add_resource(
                    Resource::builder()
                        .identity("b", Version::new(2, 0, 0))
                        .provides("svc", "X")
                        .require_identity("a", Some("[1.0,2.0)"))
                        .build()
                        .unwrap(),
                )
                .unwrap();
            b.identity().clone()
        };

        let repo = open(dir.path());
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.generation(), 2);
        let b = repo.get_resource(&identity).unwrap();
        assert_eq!(b.requirements().len(), 1);
        let providers = repo.find_providers(&Requirement::generic("svc", "X").unwrap());
        assert_eq!(providers.len(), 1);

        let a = repo
            .get_resource(&"a:1.0.0".parse().unwrap())
            .unwrap();
        assert_eq!(read(&repo, a.content_capabilities().next().unwrap()), b"one");
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _first = open(dir.path());
        let second = PersistentRepository::open(RepositoryConfig::new(dir.path()));
        assert!(matches!(second, Err(RepositoryError::Locked { .. })));
    }

    #[test]
    fn test_corrupt_blob_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let stored = repo.add_resource(with_bytes("a", b"original")).unwrap();
        let cap = stored.content_capabilities().next().unwrap();
        let digest = content_digest(cap).unwrap().to_string();

        std::fs::write(repo.blob_path(&digest), b"tampered").unwrap();
        assert!(matches!(
            repo.open_content(cap),
            Err(RepositoryError::DigestMismatch { .. })
        ));

        std::fs::remove_file(repo.blob_path(&digest)).unwrap();
        assert!(matches!(
            repo.open_content(cap),
            Err(RepositoryError::MissingContent(_))
        ));
    }

    #[test]
    fn test_external_file_is_copied_and_stored_url_is_kept() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("artifact.bin");
        std::fs::write(&source, b"external").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let url = Url::from_file_path(&source).unwrap().to_string();
        let stored = repo
            .add_resource(
                Resource::builder()
                    .identity("ext", Version::EMPTY)
                    .content_url(&url, None)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let cap = stored.content_capabilities().next().unwrap();
        let stored_url = cap.attribute("url").and_then(AttributeValue::as_str).unwrap();
        assert!(stored_url.starts_with("file://"));
        assert_ne!(stored_url, url);

        // Re-adding a resource whose content already lives in the repository
        // keeps the capability untouched.
        let mut attrs = cap.attributes().clone();
        attrs.remove("mime");
        let again = repo
            .add_resource(
                Resource::builder()
                    .identity("ext2", Version::EMPTY)
                    .capability("content", attrs.clone())
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(again.content_capabilities().next().unwrap().attributes(), &attrs);
    }

    #[test]
    fn test_missing_content_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let result = repo.add_resource(
            Resource::builder()
                .identity("broken", Version::EMPTY)
                .content_bytes(b"fine".to_vec(), None)
                .content_url("/definitely/not/here", None)
                .build()
                .unwrap(),
        );
        assert!(matches!(result, Err(RepositoryError::MissingContent(_))));
        assert!(repo.is_empty());
        assert_eq!(repo.generation(), 0);
        let digest = DigestAlgorithm::Sha256.digest_hex(b"fine");
        assert!(!repo.blob_path(&digest).exists());
    }

    #[test]
    fn test_declared_digest_is_verified() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        let source = dir.path().join("outside.bin");
        std::fs::write(&source, b"bytes").unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("content".into(), "00".repeat(32).into());
        attrs.insert("url".into(), source.to_str().unwrap().into());
        let result = repo.add_resource(
            Resource::builder()
                .identity("liar", Version::EMPTY)
                .capability("content", attrs)
                .build()
                .unwrap(),
        );
        assert!(matches!(result, Err(RepositoryError::DigestMismatch { .. })));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_blake3_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = PersistentRepository::open(
            RepositoryConfig::new(dir.path()).with_digest_algorithm(DigestAlgorithm::Blake3),
        )
        .unwrap();
        let stored = repo.add_resource(with_bytes("a", b"blake")).unwrap();
        let cap = stored.content_capabilities().next().unwrap();
        assert_eq!(
            content_digest(cap),
            Some(DigestAlgorithm::Blake3.digest_hex(b"blake").as_str())
        );
        assert_eq!(read(&repo, cap), b"blake");
    }

    /// JSON codec whose encoding can be switched off.
    #[derive(Default)]
    struct FlakyCodec {
        fail: std::sync::atomic::AtomicBool,
    }

    impl CatalogCodec for FlakyCodec {
        #[allow(clippy::unnecessary_literal_bound)]
        fn name(&self) -> &str {
            "flaky"
        }

        fn encode(&self, catalog: &CatalogDocument) -> anyhow::Result<Vec<u8>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            JsonCatalogCodec.encode(catalog)
        }

        fn decode(&self, bytes: &[u8]) -> anyhow::Result<CatalogDocument> {
            JsonCatalogCodec.decode(bytes)
        }
    }

    fn open_flaky(dir: &Path) -> (PersistentRepository, Arc<FlakyCodec>) {
        let codec = Arc::new(FlakyCodec::default());
        let repo = PersistentRepository::open_with(
            RepositoryConfig::new(dir),
            Arc::clone(&codec) as Arc<dyn CatalogCodec>,
            Arc::new(DefaultContentReader),
        )
        .unwrap();
        (repo, codec)
    }

    fn names(repo: &PersistentRepository) -> Vec<String> {
        repo.resources()
            .iter()
            .map(|r| r.identity().symbolic_name().to_string())
            .collect()
    }

    #[test]
    fn test_failed_catalog_write_rolls_back_add() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, codec) = open_flaky(dir.path());
        let first = repo.add_resource(with_bytes("first", b"kept")).unwrap();
        let catalog = std::fs::read(repo.catalog_path()).unwrap();

        codec.fail.store(true, Ordering::SeqCst);
        let err = repo.add_resource(with_bytes("second", b"dropped")).unwrap_err();
        assert!(matches!(err, RepositoryError::Catalog { .. }));

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.generation(), 1);
        let dropped = DigestAlgorithm::default().digest_hex(b"dropped");
        assert!(!repo.blob_path(&dropped).exists());
        let kept = first.content_capabilities().next().unwrap();
        assert_eq!(read(&repo, kept), b"kept");
        assert_eq!(std::fs::read(repo.catalog_path()).unwrap(), catalog);

        codec.fail.store(false, Ordering::SeqCst);
        repo.add_resource(with_bytes("second", b"dropped")).unwrap();
        assert_eq!(repo.generation(), 2);
        assert!(repo.blob_path(&dropped).is_file());
    }

    #[test]
    fn test_failed_catalog_write_rolls_back_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, codec) = open_flaky(dir.path());
        for (name, bytes) in [("a", b"aaa"), ("b", b"bbb"), ("c", b"ccc")] {
            repo.add_resource(with_bytes(name, bytes)).unwrap();
        }
        let b = repo.resources()[1].clone();
        let digest = content_digest(b.content_capabilities().next().unwrap())
            .unwrap()
            .to_string();
        let catalog = std::fs::read(repo.catalog_path()).unwrap();

        codec.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            repo.remove_resource(b.identity()),
            Err(RepositoryError::Catalog { .. })
        ));

        assert!(repo.get_resource(b.identity()).is_some());
        assert_eq!(names(&repo), vec!["a", "b", "c"]);
        assert_eq!(repo.generation(), 3);
        assert!(repo.blob_path(&digest).is_file());
        assert_eq!(std::fs::read(repo.catalog_path()).unwrap(), catalog);

        // The next successful write records the original order.
        codec.fail.store(false, Ordering::SeqCst);
        repo.add_resource(with_bytes("d", b"ddd")).unwrap();
        drop(repo);
        let reopened = open(dir.path());
        assert_eq!(names(&reopened), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_deeply_nested_catalog_filter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let identity_only = Resource::builder()
            .identity("deep", Version::new(1, 0, 0))
            .build()
            .unwrap();
        let mut entry = CatalogResource::from_resource(&identity_only);
        let depth = 100_000;
        let filter = format!("{}(svc=X){}", "(!".repeat(depth), ")".repeat(depth));
        entry.requirements.push(crate::catalog::CatalogEntry {
            namespace: "svc".to_string(),
            attributes: Vec::new(),
            directives: [("filter".to_string(), filter)].into_iter().collect(),
        });
        let document = CatalogDocument {
            name: "deep".to_string(),
            increment: 1,
            digest_algorithm: DigestAlgorithm::default(),
            resources: vec![entry],
        };
        std::fs::write(
            dir.path().join(DEFAULT_CATALOG_FILE),
            JsonCatalogCodec.encode(&document).unwrap(),
        )
        .unwrap();

        let result = PersistentRepository::open(RepositoryConfig::new(dir.path()));
        assert!(matches!(result, Err(RepositoryError::Catalog { .. })));
    }
}
