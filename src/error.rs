//! Error types for the relation engine
//!
//! Provides the error taxonomy for relation mutation commands, lazy loading,
//! and end-point management: usage errors are raised before any mutation,
//! consistency errors during expansion/registration, persistence errors only
//! when a lazy load actually runs.

use std::fmt;

use crate::identity::{ObjectId, RelationEndPointId};

/// Result type alias for relation operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Error types for relation end-point and command operations
#[derive(Debug, Clone, PartialEq)]
pub enum RelationError {
    /// Invalid argument supplied to a command constructor; no mutation has
    /// been performed and the caller can correct the call
    Usage(String),
    /// Relation data or mapping inconsistency detected during expansion or
    /// registration, before `perform` runs
    Consistency(String),
    /// Stored data violates a constraint, surfaced when a lazy load runs
    Persistence(String),
    /// A mandatory relation resolved to no data during loading
    MandatoryRelationNotSet {
        object_id: ObjectId,
        property_name: String,
    },
    /// A referenced object could not be found by the storage collaborator
    ObjectNotFound(ObjectId),
    /// `ensure_data_complete` re-entered for an end-point that is already
    /// loading; indicates a cyclic lazy-load trigger and is not meant to be
    /// caught by application code
    LoadInProgress(RelationEndPointId),
    /// No relation is defined for the given class/property pair
    Mapping(String),
    /// Transaction lifecycle misuse (wrong owning transaction, discarded
    /// transaction, foreign sub-transaction)
    Transaction(String),
}

impl fmt::Display for RelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationError::Usage(msg) => write!(f, "Usage error: {}", msg),
            RelationError::Consistency(msg) => write!(f, "Consistency error: {}", msg),
            RelationError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            RelationError::MandatoryRelationNotSet {
                object_id,
                property_name,
            } => write!(
                f,
                "Mandatory relation property '{}' of object '{}' resolved to no related data",
                property_name, object_id
            ),
            RelationError::ObjectNotFound(id) => {
                write!(f, "Object '{}' could not be found", id)
            }
            RelationError::LoadInProgress(id) => write!(
                f,
                "The data of end-point '{}' is being loaded; re-entrant loading is not supported",
                id
            ),
            RelationError::Mapping(msg) => write!(f, "Mapping error: {}", msg),
            RelationError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
        }
    }
}

impl std::error::Error for RelationError {}

impl RelationError {
    /// True for errors raised by malformed calls rather than by stored data
    pub fn is_usage(&self) -> bool {
        matches!(self, RelationError::Usage(_))
    }

    /// True for errors surfaced by the persistence layer during loading
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            RelationError::Persistence(_)
                | RelationError::MandatoryRelationNotSet { .. }
                | RelationError::ObjectNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_object_and_property() {
        let object_id = ObjectId::new("Order");
        let err = RelationError::MandatoryRelationNotSet {
            object_id: object_id.clone(),
            property_name: "OrderItems".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("OrderItems"));
        assert!(msg.contains(&object_id.to_string()));
    }

    #[test]
    fn test_error_classification() {
        assert!(RelationError::Usage("bad call".to_string()).is_usage());
        assert!(RelationError::ObjectNotFound(ObjectId::new("Order")).is_persistence());
        assert!(!RelationError::Consistency("conflict".to_string()).is_usage());
        assert!(!RelationError::Consistency("conflict".to_string()).is_persistence());
    }
}
