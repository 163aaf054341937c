//! Domain Object Collections - ordered, identity-keyed relation containers
//!
//! A collection is either standalone (freestanding, freely mutable) or
//! associated with exactly one collection end-point, in which case all
//! mutations route through the owning transaction's commands and direct
//! writes are usage errors.

pub mod data;

pub use data::{CollectionData, CollectionStorage};

use std::sync::{Arc, RwLock};

use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};

/// Ordered collection of domain object identities, duplicates forbidden.
///
/// The backing storage is exclusively owned by at most one end-point at a
/// time. Replacing a whole collection re-parents storage: the new collection's
/// storage becomes the end-point's, and the old collection keeps its own
/// storage (still holding the pre-swap contents) as a standalone copy.
#[derive(Debug, Clone)]
pub struct DomainObjectCollection {
    storage: CollectionStorage,
}

impl DomainObjectCollection {
    /// Create an empty standalone collection
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(CollectionData::new())),
        }
    }

    /// Create a standalone collection from items, rejecting duplicates
    pub fn with_items(items: Vec<ObjectId>) -> RelationResult<Self> {
        let collection = Self::new();
        {
            let mut data = collection.storage.write().expect("collection lock poisoned");
            for item in items {
                let len = data.len();
                data.insert(len, item)?;
            }
        }
        Ok(collection)
    }

    pub(crate) fn from_storage(storage: CollectionStorage) -> Self {
        Self { storage }
    }

    pub(crate) fn storage(&self) -> CollectionStorage {
        Arc::clone(&self.storage)
    }

    /// The end-point this collection backs, if any
    pub fn associated_end_point(&self) -> Option<RelationEndPointId> {
        self.read().associated_end_point().cloned()
    }

    /// Whether this collection backs a collection end-point
    pub fn is_associated(&self) -> bool {
        self.read().associated_end_point().is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.read().contains(object_id)
    }

    pub fn index_of(&self, object_id: &ObjectId) -> Option<usize> {
        self.read().index_of(object_id)
    }

    /// Snapshot of the current contents in order
    pub fn items(&self) -> Vec<ObjectId> {
        self.read().items().to_vec()
    }

    /// Append to a standalone collection
    pub fn add(&self, object_id: ObjectId) -> RelationResult<()> {
        let mut data = self.write_standalone("add")?;
        let len = data.len();
        data.insert(len, object_id)
    }

    /// Insert into a standalone collection at an index
    pub fn insert(&self, index: usize, object_id: ObjectId) -> RelationResult<()> {
        self.write_standalone("insert")?.insert(index, object_id)
    }

    /// Remove from a standalone collection; true if the object was present
    pub fn remove(&self, object_id: &ObjectId) -> RelationResult<bool> {
        Ok(self.write_standalone("remove")?.remove(object_id).is_some())
    }

    /// Clear a standalone collection
    pub fn clear(&self) -> RelationResult<()> {
        self.write_standalone("clear")?.clear();
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CollectionData> {
        self.storage.read().expect("collection lock poisoned")
    }

    fn write_standalone(
        &self,
        operation: &str,
    ) -> RelationResult<std::sync::RwLockWriteGuard<'_, CollectionData>> {
        let data = self.storage.write().expect("collection lock poisoned");
        if let Some(end_point) = data.associated_end_point() {
            return Err(RelationError::Usage(format!(
                "Cannot {} directly on the collection associated with end-point '{}'; relation \
                 mutations must go through the owning transaction",
                operation, end_point
            )));
        }
        Ok(data)
    }
}

impl Default for DomainObjectCollection {
    fn default() -> Self {
        Self::new()
    }
}
