//! Relation Definitions - static metadata describing both ends of a relation

use serde::{Deserialize, Serialize};

use crate::error::{RelationError, RelationResult};

/// Cardinality of one relation end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// The end resolves to at most one related object
    One,
    /// The end resolves to an ordered collection of related objects
    Many,
}

impl Cardinality {
    /// Returns true if this end is collection-valued
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Many)
    }
}

/// Static metadata for one end of a relation.
///
/// A virtual end stores no physical foreign key; its value is derived from the
/// opposite real end(s). An anonymous end is the invisible opposite side of a
/// unidirectional relation and has no property of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEndPointDefinition {
    /// Class owning this end
    pub class_name: String,

    /// Property on the owning class (empty for anonymous ends)
    pub property_name: String,

    /// Cardinality of this end
    pub cardinality: Cardinality,

    /// Whether this side stores no physical foreign key
    pub is_virtual: bool,

    /// Whether loading this end must resolve to at least one related object
    pub is_mandatory: bool,

    /// Whether this is the anonymous side of a unidirectional relation
    pub is_anonymous: bool,
}

impl RelationEndPointDefinition {
    /// Create a real (foreign-key-holding) single-object end
    pub fn real(class_name: impl Into<String>, property_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: property_name.into(),
            cardinality: Cardinality::One,
            is_virtual: false,
            is_mandatory: false,
            is_anonymous: false,
        }
    }

    /// Create a virtual single-object end (1:1 opposite side)
    pub fn virtual_object(
        class_name: impl Into<String>,
        property_name: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: property_name.into(),
            cardinality: Cardinality::One,
            is_virtual: true,
            is_mandatory: false,
            is_anonymous: false,
        }
    }

    /// Create a virtual collection end (1:N opposite side)
    pub fn collection(class_name: impl Into<String>, property_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: property_name.into(),
            cardinality: Cardinality::Many,
            is_virtual: true,
            is_mandatory: false,
            is_anonymous: false,
        }
    }

    /// Create the anonymous opposite side of a unidirectional relation
    pub fn anonymous(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: String::new(),
            cardinality: Cardinality::One,
            is_virtual: true,
            is_mandatory: false,
            is_anonymous: true,
        }
    }

    /// Mark this end as mandatory
    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = true;
        self
    }

    /// Validate this end in isolation
    pub fn validate(&self) -> RelationResult<()> {
        if self.class_name.is_empty() {
            return Err(RelationError::Mapping(
                "End-point definition must name a class".to_string(),
            ));
        }
        if self.property_name.is_empty() && !self.is_anonymous {
            return Err(RelationError::Mapping(format!(
                "End-point definition on class '{}' must name a property",
                self.class_name
            )));
        }
        if self.is_anonymous && !self.property_name.is_empty() {
            return Err(RelationError::Mapping(format!(
                "Anonymous end-point on class '{}' cannot name a property",
                self.class_name
            )));
        }
        if self.cardinality.is_collection() && !self.is_virtual {
            return Err(RelationError::Mapping(format!(
                "Collection end-point '{}.{}' must be virtual; the foreign key lives on the \
                 single-object side",
                self.class_name, self.property_name
            )));
        }
        Ok(())
    }
}

/// A relation between exactly two end-point definitions.
///
/// Invariant: exactly one end is non-virtual (holds the foreign key) unless
/// the relation is unidirectional, in which case the opposite end is
/// anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// Unique relation name, used in diagnostics
    pub name: String,

    /// First end of the relation
    pub first: RelationEndPointDefinition,

    /// Second end of the relation
    pub second: RelationEndPointDefinition,
}

impl RelationDefinition {
    pub fn new(
        name: impl Into<String>,
        first: RelationEndPointDefinition,
        second: RelationEndPointDefinition,
    ) -> Self {
        Self {
            name: name.into(),
            first,
            second,
        }
    }

    /// Validate the relation metadata for consistency
    pub fn validate(&self) -> RelationResult<()> {
        self.first.validate()?;
        self.second.validate()?;

        if self.first.is_anonymous && self.second.is_anonymous {
            return Err(RelationError::Mapping(format!(
                "Relation '{}' cannot have two anonymous ends",
                self.name
            )));
        }

        let real_ends = [&self.first, &self.second]
            .iter()
            .filter(|e| !e.is_virtual)
            .count();
        if real_ends != 1 {
            return Err(RelationError::Mapping(format!(
                "Relation '{}' must have exactly one non-virtual end holding the foreign key, \
                 found {}",
                self.name, real_ends
            )));
        }

        Ok(())
    }

    /// Whether this relation has an anonymous (unidirectional) side
    pub fn is_unidirectional(&self) -> bool {
        self.first.is_anonymous || self.second.is_anonymous
    }

    /// Look up the end for a given class/property
    pub fn end_point(&self, class_name: &str, property_name: &str) -> Option<&RelationEndPointDefinition> {
        [&self.first, &self.second]
            .into_iter()
            .find(|e| e.class_name == class_name && e.property_name == property_name)
    }

    /// The end opposite to the given one
    pub fn opposite(&self, end: &RelationEndPointDefinition) -> &RelationEndPointDefinition {
        if *end == self.first {
            &self.second
        } else {
            &self.first
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional_relation_validates() {
        let relation = RelationDefinition::new(
            "Customer->Orders",
            RelationEndPointDefinition::real("Order", "Customer"),
            RelationEndPointDefinition::collection("Customer", "Orders"),
        );
        assert!(relation.validate().is_ok());
        assert!(!relation.is_unidirectional());
    }

    #[test]
    fn test_unidirectional_relation_validates() {
        let relation = RelationDefinition::new(
            "Client->ParentClient",
            RelationEndPointDefinition::real("Client", "ParentClient"),
            RelationEndPointDefinition::anonymous("Client"),
        );
        assert!(relation.validate().is_ok());
        assert!(relation.is_unidirectional());
    }

    #[test]
    fn test_exactly_one_real_end_required() {
        let two_real = RelationDefinition::new(
            "broken",
            RelationEndPointDefinition::real("Order", "Customer"),
            RelationEndPointDefinition::real("Customer", "Order"),
        );
        assert!(two_real.validate().is_err());

        let two_virtual = RelationDefinition::new(
            "broken",
            RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
            RelationEndPointDefinition::virtual_object("OrderTicket", "Order"),
        );
        assert!(two_virtual.validate().is_err());
    }

    #[test]
    fn test_collection_end_must_be_virtual() {
        let mut end = RelationEndPointDefinition::collection("Customer", "Orders");
        end.is_virtual = false;
        assert!(end.validate().is_err());
    }

    #[test]
    fn test_opposite_lookup() {
        let relation = RelationDefinition::new(
            "Order->OrderTicket",
            RelationEndPointDefinition::real("OrderTicket", "Order"),
            RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
        );
        let real = relation.end_point("OrderTicket", "Order").unwrap();
        let opposite = relation.opposite(real);
        assert_eq!(opposite.class_name, "Order");
        assert!(opposite.is_virtual);
    }

    #[test]
    fn test_mandatory_builder() {
        let end = RelationEndPointDefinition::collection("Customer", "Orders").mandatory();
        assert!(end.is_mandatory);
    }

    #[test]
    fn test_relation_definition_serializes() {
        let relation = RelationDefinition::new(
            "Customer->Orders",
            RelationEndPointDefinition::real("Order", "Customer"),
            RelationEndPointDefinition::collection("Customer", "Orders").mandatory(),
        );
        let json = serde_json::to_string(&relation).unwrap();
        let restored: RelationDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.name, "Customer->Orders");
        let end = restored.end_point("Customer", "Orders").unwrap();
        assert!(end.is_mandatory);
        assert_eq!(end.cardinality, Cardinality::Many);
    }
}
