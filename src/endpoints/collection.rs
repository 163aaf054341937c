//! Collection End-Point - the 1:N relation side backing a domain collection

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use crate::collections::{CollectionData, CollectionStorage};
use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::mapping::RelationEndPointDefinition;

use super::state::CompletionState;

/// Lazily loaded collection end-point.
///
/// Owns the associated collection's storage handle exclusively; the only
/// ownership handoff is the whole-collection replace, which swaps handles
/// atomically so no two end-points ever share storage.
#[derive(Debug)]
pub struct CollectionEndPoint {
    id: RelationEndPointId,
    definition: RelationEndPointDefinition,
    state: CompletionState,
    storage: CollectionStorage,
    original: Vec<ObjectId>,
    touched: bool,
    /// Opposite real end-point owners registered before this end loaded
    pending_opposites: Vec<ObjectId>,
    /// Opposites registered after completion but absent from the loaded data
    unsynchronized_opposites: Vec<ObjectId>,
}

impl CollectionEndPoint {
    pub fn new(id: RelationEndPointId, definition: RelationEndPointDefinition) -> Self {
        let mut data = CollectionData::new();
        data.set_associated_end_point(Some(id.clone()));
        Self {
            id,
            definition,
            state: CompletionState::NotLoaded,
            storage: Arc::new(RwLock::new(data)),
            original: Vec::new(),
            touched: false,
            pending_opposites: Vec::new(),
            unsynchronized_opposites: Vec::new(),
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &RelationEndPointDefinition {
        &self.definition
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn is_data_complete(&self) -> bool {
        self.state.is_complete()
    }

    pub(crate) fn try_begin_load(&mut self) -> RelationResult<bool> {
        match self.state {
            CompletionState::Complete => Ok(false),
            CompletionState::Loading => Err(RelationError::LoadInProgress(self.id.clone())),
            CompletionState::NotLoaded => {
                self.state = CompletionState::Loading;
                Ok(true)
            }
        }
    }

    /// Install loaded data, transitioning to `Complete`.
    ///
    /// Pending opposites the loaded data does not vouch for are returned so
    /// the manager can flag their real end-points as unsynchronized.
    pub(crate) fn complete_load(&mut self, items: Vec<ObjectId>) -> Vec<ObjectId> {
        {
            let mut data = self.storage.write().expect("collection lock poisoned");
            data.replace_contents(items.clone());
        }
        self.original = items.clone();
        self.state = CompletionState::Complete;

        let pending = std::mem::take(&mut self.pending_opposites);
        let mut unvouched = Vec::new();
        for owner in pending {
            if !items.contains(&owner) {
                self.unsynchronized_opposites.push(owner.clone());
                unvouched.push(owner);
            }
        }
        unvouched
    }

    pub(crate) fn abort_load(&mut self) {
        if self.state == CompletionState::Loading {
            self.state = CompletionState::NotLoaded;
        }
    }

    /// Force-complete with externally supplied data; no-op returning false
    /// when already complete
    pub(crate) fn mark_data_complete(&mut self, items: Vec<ObjectId>) -> bool {
        if self.state.is_complete() {
            return false;
        }
        self.complete_load(items);
        true
    }

    /// Snapshot of the current contents; usage error when incomplete
    pub fn items(&self) -> RelationResult<Vec<ObjectId>> {
        self.require_complete()?;
        Ok(self
            .storage
            .read()
            .expect("collection lock poisoned")
            .items()
            .to_vec())
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.storage
            .read()
            .expect("collection lock poisoned")
            .contains(object_id)
    }

    pub fn index_of(&self, object_id: &ObjectId) -> Option<usize> {
        self.storage
            .read()
            .expect("collection lock poisoned")
            .index_of(object_id)
    }

    pub fn len(&self) -> usize {
        self.storage.read().expect("collection lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn storage_handle(&self) -> CollectionStorage {
        Arc::clone(&self.storage)
    }

    pub(crate) fn insert(&mut self, index: usize, object_id: ObjectId) -> RelationResult<()> {
        self.require_complete()?;
        self.storage
            .write()
            .expect("collection lock poisoned")
            .insert(index, object_id)
    }

    pub(crate) fn remove(&mut self, object_id: &ObjectId) -> RelationResult<usize> {
        self.require_complete()?;
        self.storage
            .write()
            .expect("collection lock poisoned")
            .remove(object_id)
            .ok_or_else(|| {
                RelationError::Usage(format!(
                    "Object '{}' is not part of collection end-point '{}'",
                    object_id, self.id
                ))
            })
    }

    pub(crate) fn replace(&mut self, index: usize, object_id: ObjectId) -> RelationResult<ObjectId> {
        self.require_complete()?;
        self.storage
            .write()
            .expect("collection lock poisoned")
            .replace(index, object_id)
    }

    pub(crate) fn replace_contents(&mut self, items: Vec<ObjectId>) -> RelationResult<()> {
        self.require_complete()?;
        let mut data = self.storage.write().expect("collection lock poisoned");
        data.replace_contents(items);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.storage
            .write()
            .expect("collection lock poisoned")
            .clear();
    }

    /// Sort the contents in place; returns true when the order changed
    pub(crate) fn sort_by<F>(&mut self, compare: F) -> RelationResult<bool>
    where
        F: FnMut(&ObjectId, &ObjectId) -> Ordering,
    {
        self.require_complete()?;
        Ok(self
            .storage
            .write()
            .expect("collection lock poisoned")
            .sort_by(compare))
    }

    /// Swap the backing storage for a replacement collection's storage.
    ///
    /// The old handle is disassociated (its holder becomes a standalone
    /// collection keeping the pre-swap contents) and returned.
    pub(crate) fn replace_storage(&mut self, new_storage: CollectionStorage) -> CollectionStorage {
        {
            let mut old = self.storage.write().expect("collection lock poisoned");
            old.set_associated_end_point(None);
        }
        {
            let mut new = new_storage.write().expect("collection lock poisoned");
            new.set_associated_end_point(Some(self.id.clone()));
        }
        std::mem::replace(&mut self.storage, new_storage)
    }

    pub fn has_changed(&self) -> bool {
        if !self.state.is_complete() {
            return false;
        }
        let data = self.storage.read().expect("collection lock poisoned");
        data.items() != self.original.as_slice()
    }

    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    pub fn touch(&mut self) {
        self.touched = true;
    }

    pub(crate) fn register_opposite(&mut self, owner: ObjectId) -> bool {
        match self.state {
            CompletionState::Complete => {
                if self.contains(&owner) {
                    true
                } else {
                    if !self.unsynchronized_opposites.contains(&owner) {
                        self.unsynchronized_opposites.push(owner);
                    }
                    false
                }
            }
            _ => {
                if !self.pending_opposites.contains(&owner) {
                    self.pending_opposites.push(owner);
                }
                true
            }
        }
    }

    pub(crate) fn unregister_opposite(&mut self, owner: &ObjectId) {
        self.pending_opposites.retain(|o| o != owner);
        self.unsynchronized_opposites.retain(|o| o != owner);
    }

    /// Opposite owners registered before this end loaded
    pub(crate) fn pending_opposites(&self) -> &[ObjectId] {
        &self.pending_opposites
    }

    /// Opposites currently known but not vouched for by the loaded data
    pub fn unsynchronized_opposites(&self) -> &[ObjectId] {
        &self.unsynchronized_opposites
    }

    /// Fold unsynchronized opposites into the collection, in registration
    /// order, without registering as a value-level change
    pub(crate) fn synchronize(&mut self) -> RelationResult<Vec<ObjectId>> {
        self.require_complete()?;
        let adopted = std::mem::take(&mut self.unsynchronized_opposites);
        {
            let mut data = self.storage.write().expect("collection lock poisoned");
            for owner in &adopted {
                let len = data.len();
                data.insert(len, owner.clone())?;
            }
        }
        self.original.extend(adopted.iter().cloned());
        Ok(adopted)
    }

    pub(crate) fn commit(&mut self) {
        if self.state.is_complete() {
            self.original = self
                .storage
                .read()
                .expect("collection lock poisoned")
                .items()
                .to_vec();
        }
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        if self.state.is_complete() {
            self.storage
                .write()
                .expect("collection lock poisoned")
                .replace_contents(self.original.clone());
        }
        self.touched = false;
    }

    /// Deep copy for an independent sub-transaction registry; never shares
    /// the storage handle across the transaction boundary
    pub(crate) fn clone_detached(&self) -> Self {
        let data = self
            .storage
            .read()
            .expect("collection lock poisoned")
            .clone();
        Self {
            id: self.id.clone(),
            definition: self.definition.clone(),
            state: self.state,
            storage: Arc::new(RwLock::new(data)),
            original: self.original.clone(),
            touched: self.touched,
            pending_opposites: self.pending_opposites.clone(),
            unsynchronized_opposites: self.unsynchronized_opposites.clone(),
        }
    }

    fn require_complete(&self) -> RelationResult<()> {
        if !self.state.is_complete() {
            return Err(RelationError::Usage(format!(
                "The data of end-point '{}' is incomplete; call ensure_data_complete first",
                self.id
            )));
        }
        Ok(())
    }
}
