//! Storage Collaborator Contract - blocking relation data loading
//!
//! The engine never talks to physical storage itself; it requests related
//! object identities through this trait when an end-point's
//! `ensure_data_complete` runs. Loading is a blocking call; there is no
//! asynchronous path.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};

/// Supplies related object identities for a relation end-point.
///
/// Implementations must signal `RelationError::ObjectNotFound` when a stored
/// foreign key references a missing row; the mandatory-relation check itself
/// is applied by the end-point after the load returns.
pub trait RelationLoader: Debug + Send + Sync {
    /// Load the single related object of a virtual object end-point
    fn load_related_object(&self, id: &RelationEndPointId) -> RelationResult<Option<ObjectId>>;

    /// Load the ordered related objects of a collection end-point
    fn load_related_objects(&self, id: &RelationEndPointId) -> RelationResult<Vec<ObjectId>>;
}

/// In-memory relation source with load counting.
///
/// Reference implementation of the loader contract, used by the crate's own
/// tests (the at-most-once-load property needs the counter) and usable as a
/// fixture by downstream test suites.
#[derive(Debug, Default)]
pub struct InMemoryRelationSource {
    objects: RwLock<HashMap<RelationEndPointId, Option<ObjectId>>>,
    collections: RwLock<HashMap<RelationEndPointId, Vec<ObjectId>>>,
    load_count: AtomicUsize,
}

impl InMemoryRelationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the single related object of a virtual object end-point
    pub fn put_related_object(&self, id: RelationEndPointId, related: Option<ObjectId>) {
        self.objects
            .write()
            .expect("relation source lock poisoned")
            .insert(id, related);
    }

    /// Seed the related objects of a collection end-point
    pub fn put_related_objects(&self, id: RelationEndPointId, related: Vec<ObjectId>) {
        self.collections
            .write()
            .expect("relation source lock poisoned")
            .insert(id, related);
    }

    /// Number of loads served so far
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }
}

impl RelationLoader for InMemoryRelationSource {
    fn load_related_object(&self, id: &RelationEndPointId) -> RelationResult<Option<ObjectId>> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .expect("relation source lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| RelationError::ObjectNotFound(id.object_id().clone()))
    }

    fn load_related_objects(&self, id: &RelationEndPointId) -> RelationResult<Vec<ObjectId>> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        self.collections
            .read()
            .expect("relation source lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| RelationError::ObjectNotFound(id.object_id().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_data_round_trip() {
        let source = InMemoryRelationSource::new();
        let customer = ObjectId::new("Customer");
        let orders_id = RelationEndPointId::new(customer.clone(), "Orders");
        let order = ObjectId::new("Order");
        source.put_related_objects(orders_id.clone(), vec![order.clone()]);

        assert_eq!(source.load_related_objects(&orders_id).unwrap(), vec![order]);
        assert_eq!(source.load_count(), 1);
    }

    #[test]
    fn test_unseeded_end_point_is_not_found() {
        let source = InMemoryRelationSource::new();
        let id = RelationEndPointId::new(ObjectId::new("Order"), "OrderTicket");
        let err = source.load_related_object(&id).unwrap_err();
        assert!(matches!(err, RelationError::ObjectNotFound(_)));
    }
}
