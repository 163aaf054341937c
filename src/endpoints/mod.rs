//! Relation End-Points - real, virtual object, and collection variants
//!
//! Each end-point wraps a lazily loadable data slot keyed by its
//! `RelationEndPointId`. Real end-points are complete on registration;
//! virtual and collection end-points start incomplete and load on first
//! access through the owning transaction's storage collaborator.

pub mod collection;
pub mod real_object;
pub mod state;
pub mod virtual_object;

pub use collection::CollectionEndPoint;
pub use real_object::RealObjectEndPoint;
pub use state::CompletionState;
pub use virtual_object::VirtualObjectEndPoint;

use crate::error::{RelationError, RelationResult};
use crate::identity::RelationEndPointId;
use crate::mapping::RelationEndPointDefinition;

/// A relation end-point materialized in a transaction's registry.
#[derive(Debug)]
pub enum RelationEndPoint {
    Real(RealObjectEndPoint),
    VirtualObject(VirtualObjectEndPoint),
    Collection(CollectionEndPoint),
}

impl RelationEndPoint {
    pub fn id(&self) -> &RelationEndPointId {
        match self {
            Self::Real(ep) => ep.id(),
            Self::VirtualObject(ep) => ep.id(),
            Self::Collection(ep) => ep.id(),
        }
    }

    pub fn definition(&self) -> &RelationEndPointDefinition {
        match self {
            Self::Real(ep) => ep.definition(),
            Self::VirtualObject(ep) => ep.definition(),
            Self::Collection(ep) => ep.definition(),
        }
    }

    pub fn is_data_complete(&self) -> bool {
        match self {
            Self::Real(_) => true,
            Self::VirtualObject(ep) => ep.is_data_complete(),
            Self::Collection(ep) => ep.is_data_complete(),
        }
    }

    pub fn has_been_touched(&self) -> bool {
        match self {
            Self::Real(ep) => ep.has_been_touched(),
            Self::VirtualObject(ep) => ep.has_been_touched(),
            Self::Collection(ep) => ep.has_been_touched(),
        }
    }

    pub fn has_changed(&self) -> bool {
        match self {
            Self::Real(ep) => ep.has_changed(),
            Self::VirtualObject(ep) => ep.has_changed(),
            Self::Collection(ep) => ep.has_changed(),
        }
    }

    pub fn touch(&mut self) {
        match self {
            Self::Real(ep) => ep.touch(),
            Self::VirtualObject(ep) => ep.touch(),
            Self::Collection(ep) => ep.touch(),
        }
    }

    pub(crate) fn commit(&mut self) {
        match self {
            Self::Real(ep) => ep.commit(),
            Self::VirtualObject(ep) => ep.commit(),
            Self::Collection(ep) => ep.commit(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        match self {
            Self::Real(ep) => ep.rollback(),
            Self::VirtualObject(ep) => ep.rollback(),
            Self::Collection(ep) => ep.rollback(),
        }
    }

    /// Deep copy for an independent sub-transaction registry
    pub(crate) fn clone_detached(&self) -> Self {
        match self {
            Self::Real(ep) => Self::Real(ep.clone()),
            Self::VirtualObject(ep) => Self::VirtualObject(ep.clone()),
            Self::Collection(ep) => Self::Collection(ep.clone_detached()),
        }
    }

    pub fn as_real(&self) -> RelationResult<&RealObjectEndPoint> {
        match self {
            Self::Real(ep) => Ok(ep),
            other => Err(not_a(other, "real object end-point")),
        }
    }

    pub(crate) fn as_real_mut(&mut self) -> RelationResult<&mut RealObjectEndPoint> {
        match self {
            Self::Real(ep) => Ok(ep),
            other => Err(not_a(other, "real object end-point")),
        }
    }

    pub fn as_virtual_object(&self) -> RelationResult<&VirtualObjectEndPoint> {
        match self {
            Self::VirtualObject(ep) => Ok(ep),
            other => Err(not_a(other, "virtual object end-point")),
        }
    }

    pub(crate) fn as_virtual_object_mut(&mut self) -> RelationResult<&mut VirtualObjectEndPoint> {
        match self {
            Self::VirtualObject(ep) => Ok(ep),
            other => Err(not_a(other, "virtual object end-point")),
        }
    }

    pub fn as_collection(&self) -> RelationResult<&CollectionEndPoint> {
        match self {
            Self::Collection(ep) => Ok(ep),
            other => Err(not_a(other, "collection end-point")),
        }
    }

    pub(crate) fn as_collection_mut(&mut self) -> RelationResult<&mut CollectionEndPoint> {
        match self {
            Self::Collection(ep) => Ok(ep),
            other => Err(not_a(other, "collection end-point")),
        }
    }
}

fn not_a(end_point: &RelationEndPoint, expected: &str) -> RelationError {
    RelationError::Usage(format!(
        "End-point '{}' is not a {}",
        end_point.id(),
        expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ObjectId;

    #[test]
    fn test_variant_accessors() {
        let order = ObjectId::new("Order");
        let ep = RelationEndPoint::Real(RealObjectEndPoint::new(
            RelationEndPointId::new(order, "Customer"),
            RelationEndPointDefinition::real("Order", "Customer"),
            None,
        ));

        assert!(ep.as_real().is_ok());
        assert!(ep.as_collection().is_err());
        assert!(ep.is_data_complete());
        assert!(!ep.has_been_touched());
    }

    #[test]
    fn test_collection_variant_starts_incomplete() {
        let customer = ObjectId::new("Customer");
        let ep = RelationEndPoint::Collection(CollectionEndPoint::new(
            RelationEndPointId::new(customer, "Orders"),
            RelationEndPointDefinition::collection("Customer", "Orders"),
        ));
        assert!(!ep.is_data_complete());
        assert!(!ep.has_changed());
    }
}
