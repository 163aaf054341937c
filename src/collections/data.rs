//! Collection Data Strategy - the raw ordered storage behind a collection

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};

/// Shared handle to collection storage.
///
/// At most one end-point holds a given handle at a time; handing the storage
/// to another owner happens only through the whole-collection replace command.
pub type CollectionStorage = Arc<RwLock<CollectionData>>;

/// Ordered sequence of object identities with identity-based duplicate
/// rejection, plus the association marker tying the storage to an end-point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionData {
    items: Vec<ObjectId>,
    associated_end_point: Option<RelationEndPointId>,
}

impl CollectionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ObjectId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.items.iter().any(|item| item == object_id)
    }

    pub fn index_of(&self, object_id: &ObjectId) -> Option<usize> {
        self.items.iter().position(|item| item == object_id)
    }

    pub fn associated_end_point(&self) -> Option<&RelationEndPointId> {
        self.associated_end_point.as_ref()
    }

    pub fn set_associated_end_point(&mut self, end_point: Option<RelationEndPointId>) {
        self.associated_end_point = end_point;
    }

    /// Insert at an index; duplicates by identity are usage errors
    pub fn insert(&mut self, index: usize, object_id: ObjectId) -> RelationResult<()> {
        if self.contains(&object_id) {
            return Err(RelationError::Usage(format!(
                "Object '{}' is already part of the collection",
                object_id
            )));
        }
        if index > self.items.len() {
            return Err(RelationError::Usage(format!(
                "Index {} is out of bounds for a collection of {} items",
                index,
                self.items.len()
            )));
        }
        self.items.insert(index, object_id);
        Ok(())
    }

    /// Remove by identity, returning the index the object occupied
    pub fn remove(&mut self, object_id: &ObjectId) -> Option<usize> {
        let index = self.index_of(object_id)?;
        self.items.remove(index);
        Some(index)
    }

    /// Replace the slot at an index, returning the previous occupant
    pub fn replace(&mut self, index: usize, object_id: ObjectId) -> RelationResult<ObjectId> {
        if index >= self.items.len() {
            return Err(RelationError::Usage(format!(
                "Index {} is out of bounds for a collection of {} items",
                index,
                self.items.len()
            )));
        }
        if self.items[index] != object_id && self.contains(&object_id) {
            return Err(RelationError::Usage(format!(
                "Object '{}' is already part of the collection",
                object_id
            )));
        }
        Ok(std::mem::replace(&mut self.items[index], object_id))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replace the whole contents; used when adopting externally supplied data
    pub fn replace_contents(&mut self, items: Vec<ObjectId>) {
        self.items = items;
    }

    /// Sort in place; returns true when the resulting order differs
    pub fn sort_by<F>(&mut self, mut compare: F) -> bool
    where
        F: FnMut(&ObjectId, &ObjectId) -> Ordering,
    {
        let before = self.items.clone();
        self.items.sort_by(&mut compare);
        self.items != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_replace_round() {
        let a = ObjectId::new("Order");
        let b = ObjectId::new("Order");
        let c = ObjectId::new("Order");

        let mut data = CollectionData::new();
        data.insert(0, a.clone()).unwrap();
        data.insert(1, b.clone()).unwrap();
        assert!(data.insert(0, a.clone()).is_err());
        assert!(data.insert(5, c.clone()).is_err());

        let previous = data.replace(1, c.clone()).unwrap();
        assert_eq!(previous, b);
        assert_eq!(data.items(), &[a.clone(), c.clone()]);

        assert_eq!(data.remove(&a), Some(0));
        assert_eq!(data.remove(&a), None);
        assert_eq!(data.items(), &[c]);
    }

    #[test]
    fn test_replace_rejects_duplicate_at_other_slot() {
        let a = ObjectId::new("Order");
        let b = ObjectId::new("Order");
        let mut data = CollectionData::new();
        data.insert(0, a.clone()).unwrap();
        data.insert(1, b.clone()).unwrap();

        assert!(data.replace(1, a).is_err());
    }

    #[test]
    fn test_replace_same_object_at_same_slot_allowed() {
        let a = ObjectId::new("Order");
        let mut data = CollectionData::new();
        data.insert(0, a.clone()).unwrap();
        assert_eq!(data.replace(0, a.clone()).unwrap(), a);
    }

    #[test]
    fn test_sort_by_reports_whether_order_changed() {
        let a = ObjectId::new("Order");
        let b = ObjectId::new("Order");
        let mut data = CollectionData::new();
        data.insert(0, a.clone()).unwrap();
        data.insert(1, b.clone()).unwrap();

        // Already in this comparator's order: no change reported.
        let order = vec![a.clone(), b.clone()];
        let position = |x: &ObjectId| order.iter().position(|o| o == x).unwrap();
        assert!(!data.sort_by(|x, y| position(x).cmp(&position(y))));

        // Reverse comparator changes the order.
        assert!(data.sort_by(|x, y| position(y).cmp(&position(x))));
        assert_eq!(data.items(), &[b, a]);
    }
}
