//! Object and end-point identity
//!
//! Immutable, hashable keys: `ObjectId` identifies a domain object,
//! `RelationEndPointId` identifies "this relation property, on this object"
//! and is the registry key for end-point lookup within a transaction.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a domain object: its class name plus a unique value.
///
/// Objects are referred to by identity throughout the engine; relations are
/// identity references into the transaction's end-point registry, never
/// owning pointers, so cyclic relation graphs are unremarkable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    class_name: String,
    value: Uuid,
}

impl ObjectId {
    /// Create a new object identity with a random value
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            value: Uuid::new_v4(),
        }
    }

    /// Create an object identity with an explicit value
    pub fn with_value(class_name: impl Into<String>, value: Uuid) -> Self {
        Self {
            class_name: class_name.into(),
            value,
        }
    }

    /// The class the object belongs to
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The unique value component
    pub fn value(&self) -> Uuid {
        self.value
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class_name, self.value)
    }
}

/// Identity of one relation end-point: owning object plus property name.
///
/// Two IDs are equal iff both components are equal. The registry never holds
/// more than one end-point per ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationEndPointId {
    object_id: ObjectId,
    property_name: String,
}

impl RelationEndPointId {
    pub fn new(object_id: ObjectId, property_name: impl Into<String>) -> Self {
        Self {
            object_id,
            property_name: property_name.into(),
        }
    }

    /// The owning object's identity
    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    /// The relation property on the owning object
    pub fn property_name(&self) -> &str {
        &self.property_name
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.property_name)
    }
}
