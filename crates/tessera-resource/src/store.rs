//! Thread-safe resource store with a capability index.
//!
//! The store keeps two structures behind independent locks: the resource
//! entries and the capability cache. Mutations take the entries lock and then
//! the cache lock, and hold both until the change is complete, so readers
//! never observe a resource without its index entries or the reverse.
//! Lookups touch only one of the two locks.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::attribute::AttributeValue;
use crate::capability::{Capability, Requirement};
use crate::error::{ResourceError, ResourceResult};
use crate::identity::ResourceIdentity;
use crate::policy::{DefaultMatchPolicy, MatchPolicy};
use crate::resource::Resource;

/// Read access to a collection of resources.
pub trait ResourceIndex: Send + Sync {
    /// Name of the index, used in logs.
    fn name(&self) -> &str;

    /// Looks up a resource by identity.
    fn get_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>>;

    /// Capabilities that satisfy `requirement`, in insertion order and
    /// without duplicates.
    fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<Capability>>;

    /// Snapshot of all resources in insertion order.
    fn resources(&self) -> Vec<Arc<Resource>>;
}

impl<T: ResourceIndex + ?Sized> ResourceIndex for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>> {
        (**self).get_resource(identity)
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<Capability>> {
        (**self).find_providers(requirement)
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        (**self).resources()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    namespace: String,
    value: Option<String>,
}

impl CacheKey {
    fn for_capability(capability: &Capability) -> Vec<Self> {
        let namespace = capability.namespace().to_string();
        match capability.primary_value() {
            None => vec![Self {
                namespace,
                value: None,
            }],
            Some(AttributeValue::List(items)) if !items.is_empty() => items
                .iter()
                .map(|item| Self {
                    namespace: namespace.clone(),
                    value: Some(item.value_string()),
                })
                .collect(),
            Some(value) => vec![Self {
                namespace,
                value: Some(value.value_string()),
            }],
        }
    }

    /// `None` when the requirement is a namespace-wide query.
    fn for_requirement(requirement: &Requirement) -> Option<Self> {
        match requirement.primary_value() {
            None | Some(AttributeValue::List(_)) => None,
            Some(value) => Some(Self {
                namespace: requirement.namespace().to_string(),
                value: Some(value.value_string()),
            }),
        }
    }
}

/// A capability plus its position in the store, used to keep results in
/// insertion order.
#[derive(Debug, Clone)]
struct Indexed {
    seq: u64,
    position: usize,
    capability: Arc<Capability>,
}

#[derive(Debug, Default)]
struct Entries {
    by_identity: HashMap<ResourceIdentity, (u64, Arc<Resource>)>,
    order: BTreeMap<u64, ResourceIdentity>,
    next_seq: u64,
}

type Buckets = BTreeMap<CacheKey, Vec<Indexed>>;

/// A resource taken out of a [`ResourceStore`] along with its position.
#[derive(Debug, Clone)]
pub struct RemovedResource {
    seq: u64,
    resource: Arc<Resource>,
}

impl RemovedResource {
    /// The removed resource.
    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Unwraps the removed resource.
    #[must_use]
    pub fn into_resource(self) -> Arc<Resource> {
        self.resource
    }
}

/// An indexed, thread-safe, in-memory collection of resources.
#[derive(Debug)]
pub struct ResourceStore {
    name: String,
    policy: Arc<dyn MatchPolicy>,
    entries: RwLock<Entries>,
    cache: RwLock<Buckets>,
}

impl ResourceStore {
    /// Creates an empty store using [`DefaultMatchPolicy`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: Arc::new(DefaultMatchPolicy),
            entries: RwLock::new(Entries::default()),
            cache: RwLock::new(Buckets::new()),
        }
    }

    /// Replaces the match policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn MatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Match policy used by [`find_providers`](ResourceIndex::find_providers).
    #[must_use]
    pub fn policy(&self) -> &Arc<dyn MatchPolicy> {
        &self.policy
    }

    /// An independent copy holding the same resources under a new name.
    #[must_use]
    pub fn copy_as(&self, name: impl Into<String>) -> Self {
        let copy = Self::new(name).with_policy(Arc::clone(&self.policy));
        for resource in self.resources() {
            // Identities are unique in `self`, so this cannot collide.
            let _ = copy.add_resource(resource);
        }
        copy
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Buckets> {
        self.cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Buckets> {
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Adds a resource and indexes its capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateIdentity`] if a resource with the
    /// same identity is present. The store is unchanged in that case.
    pub fn add_resource(&self, resource: impl Into<Arc<Resource>>) -> ResourceResult<Arc<Resource>> {
        let resource = resource.into();
        let mut entries = self.write_entries();
        if entries.by_identity.contains_key(resource.identity()) {
            return Err(ResourceError::DuplicateIdentity(resource.identity().clone()));
        }
        let seq = entries.next_seq;
        entries.next_seq = seq.wrapping_add(1);
        self.insert(entries, seq, &resource);

        debug!(store = %self.name, identity = %resource.identity(), "Resource added");
        Ok(resource)
    }

    /// Puts back a resource taken with [`take_resource`](Self::take_resource)
    /// at its former position in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateIdentity`] if a resource with the
    /// same identity was added in the meantime.
    pub fn restore_resource(&self, removed: RemovedResource) -> ResourceResult<Arc<Resource>> {
        let RemovedResource { seq, resource } = removed;
        let mut entries = self.write_entries();
        if entries.by_identity.contains_key(resource.identity()) {
            return Err(ResourceError::DuplicateIdentity(resource.identity().clone()));
        }
        // A cleared store restarts its sequence and may have reused the slot.
        let seq = if entries.order.contains_key(&seq) {
            let fresh = entries.next_seq;
            entries.next_seq = fresh.wrapping_add(1);
            fresh
        } else {
            seq
        };
        self.insert(entries, seq, &resource);

        debug!(store = %self.name, identity = %resource.identity(), seq, "Resource restored");
        Ok(resource)
    }

    fn insert(&self, mut entries: RwLockWriteGuard<'_, Entries>, seq: u64, resource: &Arc<Resource>) {
        let identity = resource.identity().clone();
        let mut cache = self.write_cache();
        for (position, capability) in resource.capabilities().iter().enumerate() {
            for key in CacheKey::for_capability(capability) {
                let bucket = cache.entry(key).or_default();
                let at = bucket.partition_point(|indexed| (indexed.seq, indexed.position) < (seq, position));
                bucket.insert(at, Indexed {
                    seq,
                    position,
                    capability: Arc::clone(capability),
                });
            }
        }
        entries
            .by_identity
            .insert(identity.clone(), (seq, Arc::clone(resource)));
        entries.order.insert(seq, identity);
        drop(cache);
        drop(entries);
    }

    /// Removes a resource and its index entries. Returns `None` if absent.
    pub fn remove_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>> {
        self.take_resource(identity).map(RemovedResource::into_resource)
    }

    /// Like [`remove_resource`](Self::remove_resource), but keeps the
    /// resource's position so [`restore_resource`](Self::restore_resource)
    /// can undo the removal.
    pub fn take_resource(&self, identity: &ResourceIdentity) -> Option<RemovedResource> {
        let mut entries = self.write_entries();
        let (seq, resource) = entries.by_identity.remove(identity)?;
        entries.order.remove(&seq);

        let mut cache = self.write_cache();
        for capability in resource.capabilities() {
            for key in CacheKey::for_capability(capability) {
                if let Some(bucket) = cache.get_mut(&key) {
                    bucket.retain(|indexed| indexed.seq != seq);
                    if bucket.is_empty() {
                        cache.remove(&key);
                    }
                }
            }
        }
        drop(cache);
        drop(entries);

        debug!(store = %self.name, identity = %identity, "Resource removed");
        Some(RemovedResource { seq, resource })
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_entries().by_identity.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a resource with `identity` is present.
    #[must_use]
    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        self.read_entries().by_identity.contains_key(identity)
    }

    /// Removes every resource.
    pub fn clear(&self) {
        let mut entries = self.write_entries();
        let mut cache = self.write_cache();
        *entries = Entries::default();
        cache.clear();
    }

    fn candidates(&self, requirement: &Requirement) -> Vec<Indexed> {
        let cache = self.read_cache();
        if let Some(key) = CacheKey::for_requirement(requirement) {
            return cache.get(&key).cloned().unwrap_or_default();
        }

        // Namespace-wide query: union every bucket of the namespace.
        let start = CacheKey {
            namespace: requirement.namespace().to_string(),
            value: None,
        };
        let mut found: Vec<Indexed> = cache
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(|(key, _)| key.namespace == requirement.namespace())
            .flat_map(|(_, bucket)| bucket.iter().cloned())
            .collect();
        drop(cache);

        found.sort_by_key(|indexed| (indexed.seq, indexed.position));
        found.dedup_by_key(|indexed| (indexed.seq, indexed.position));
        found
    }
}

impl ResourceIndex for ResourceStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_resource(&self, identity: &ResourceIdentity) -> Option<Arc<Resource>> {
        self.read_entries()
            .by_identity
            .get(identity)
            .map(|(_, resource)| Arc::clone(resource))
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<Capability>> {
        self.candidates(requirement)
            .into_iter()
            .filter(|indexed| self.policy.matches(&indexed.capability, requirement))
            .map(|indexed| indexed.capability)
            .collect()
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        let entries = self.read_entries();
        entries
            .order
            .values()
            .filter_map(|identity| entries.by_identity.get(identity))
            .map(|(_, resource)| Arc::clone(resource))
            .collect()
    }
}
