//! Real Object End-Point - the relation side that stores the foreign key

use crate::identity::{ObjectId, RelationEndPointId};
use crate::mapping::RelationEndPointDefinition;

/// Relation end-point holding a physical foreign key.
///
/// Real end-points are complete as soon as their owning object's row is
/// registered with the transaction; the foreign key travels with the row and
/// never loads lazily.
#[derive(Debug, Clone)]
pub struct RealObjectEndPoint {
    id: RelationEndPointId,
    definition: RelationEndPointDefinition,
    current: Option<ObjectId>,
    original: Option<ObjectId>,
    touched: bool,
    synchronized: bool,
}

impl RealObjectEndPoint {
    pub fn new(
        id: RelationEndPointId,
        definition: RelationEndPointDefinition,
        foreign_key: Option<ObjectId>,
    ) -> Self {
        Self {
            id,
            definition,
            current: foreign_key.clone(),
            original: foreign_key,
            touched: false,
            synchronized: true,
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &RelationEndPointDefinition {
        &self.definition
    }

    /// The currently referenced opposite object, if any
    pub fn opposite_object(&self) -> Option<&ObjectId> {
        self.current.as_ref()
    }

    /// The value as of the last commit (or initial registration)
    pub fn original_opposite_object(&self) -> Option<&ObjectId> {
        self.original.as_ref()
    }

    pub(crate) fn set_opposite_object(&mut self, value: Option<ObjectId>) {
        self.current = value;
    }

    pub fn has_changed(&self) -> bool {
        self.current != self.original
    }

    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    /// Mark the end-point as accessed without altering its value
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Whether the stored foreign key agrees with the opposite end's current
    /// known membership in this transaction
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub(crate) fn set_synchronized(&mut self, synchronized: bool) {
        self.synchronized = synchronized;
    }

    pub(crate) fn commit(&mut self) {
        self.original = self.current.clone();
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        self.current = self.original.clone();
        self.touched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::RelationEndPointDefinition;

    fn end_point(foreign_key: Option<ObjectId>) -> RealObjectEndPoint {
        let owner = ObjectId::new("Order");
        RealObjectEndPoint::new(
            RelationEndPointId::new(owner, "Customer"),
            RelationEndPointDefinition::real("Order", "Customer"),
            foreign_key,
        )
    }

    #[test]
    fn test_complete_on_construction() {
        let customer = ObjectId::new("Customer");
        let ep = end_point(Some(customer.clone()));
        assert_eq!(ep.opposite_object(), Some(&customer));
        assert!(!ep.has_changed());
        assert!(!ep.has_been_touched());
        assert!(ep.is_synchronized());
    }

    #[test]
    fn test_change_and_commit_cycle() {
        let old = ObjectId::new("Customer");
        let new = ObjectId::new("Customer");
        let mut ep = end_point(Some(old.clone()));

        ep.set_opposite_object(Some(new.clone()));
        ep.touch();
        assert!(ep.has_changed());
        assert!(ep.has_been_touched());

        ep.commit();
        assert!(!ep.has_changed());
        assert!(!ep.has_been_touched());
        assert_eq!(ep.original_opposite_object(), Some(&new));
    }

    #[test]
    fn test_rollback_restores_original() {
        let old = ObjectId::new("Customer");
        let mut ep = end_point(Some(old.clone()));
        ep.set_opposite_object(None);
        ep.touch();

        ep.rollback();
        assert_eq!(ep.opposite_object(), Some(&old));
        assert!(!ep.has_been_touched());
    }

    #[test]
    fn test_touch_alone_does_not_change() {
        let mut ep = end_point(None);
        ep.touch();
        assert!(ep.has_been_touched());
        assert!(!ep.has_changed());
    }
}
