//! Mapping Registry - runtime storage and lookup for relation definitions

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{RelationError, RelationResult};
use super::definition::{RelationDefinition, RelationEndPointDefinition};

/// Thread-safe registry of relation definitions and class hierarchy data.
///
/// Relations are indexed per (class, property); anonymous ends have no
/// property and are therefore not indexed. The class hierarchy feeds the
/// inheritance-root comparison used by command construction to validate that
/// a supplied object belongs to the class an end-point expects.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    /// Map of "Class.Property" -> relation definition
    relations: Arc<DashMap<(String, String), Arc<RelationDefinition>>>,

    /// Map of class -> base class (classes without an entry are roots)
    base_classes: Arc<DashMap<String, String>>,
}

impl MappingRegistry {
    /// Create a new empty mapping registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation; both non-anonymous ends become addressable
    pub fn register(&self, relation: RelationDefinition) -> RelationResult<()> {
        relation.validate()?;
        let relation = Arc::new(relation);

        for end in [&relation.first, &relation.second] {
            if end.is_anonymous {
                continue;
            }
            let key = (end.class_name.clone(), end.property_name.clone());
            if self.relations.contains_key(&key) {
                return Err(RelationError::Mapping(format!(
                    "A relation for property '{}.{}' is already registered",
                    end.class_name, end.property_name
                )));
            }
            self.relations.insert(key, Arc::clone(&relation));
        }
        Ok(())
    }

    /// Register a class as derived from a base class
    pub fn register_subclass(&self, class_name: impl Into<String>, base: impl Into<String>) {
        self.base_classes.insert(class_name.into(), base.into());
    }

    /// Get the relation a class/property participates in
    pub fn get_relation(
        &self,
        class_name: &str,
        property_name: &str,
    ) -> Option<Arc<RelationDefinition>> {
        self.relations
            .get(&(class_name.to_string(), property_name.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Get the relation, failing with a mapping error when none exists
    pub fn require_relation(
        &self,
        class_name: &str,
        property_name: &str,
    ) -> RelationResult<Arc<RelationDefinition>> {
        self.get_relation(class_name, property_name).ok_or_else(|| {
            RelationError::Mapping(format!(
                "No relation is defined for property '{}.{}'",
                class_name, property_name
            ))
        })
    }

    /// The end-point definition for a class/property
    pub fn end_point_definition(
        &self,
        class_name: &str,
        property_name: &str,
    ) -> RelationResult<RelationEndPointDefinition> {
        let relation = self.require_relation(class_name, property_name)?;
        relation
            .end_point(class_name, property_name)
            .cloned()
            .ok_or_else(|| {
                RelationError::Mapping(format!(
                    "Relation '{}' has no end for '{}.{}'",
                    relation.name, class_name, property_name
                ))
            })
    }

    /// The definition of the end opposite to a class/property
    pub fn opposite_definition(
        &self,
        class_name: &str,
        property_name: &str,
    ) -> RelationResult<RelationEndPointDefinition> {
        let relation = self.require_relation(class_name, property_name)?;
        let own = relation.end_point(class_name, property_name).ok_or_else(|| {
            RelationError::Mapping(format!(
                "Relation '{}' has no end for '{}.{}'",
                relation.name, class_name, property_name
            ))
        })?;
        Ok(relation.opposite(own).clone())
    }

    /// Whether a class/property is a relation property at all
    pub fn is_relation_property(&self, class_name: &str, property_name: &str) -> bool {
        self.relations
            .contains_key(&(class_name.to_string(), property_name.to_string()))
    }

    /// All end-point definitions declared on a class (both real and virtual)
    pub fn end_point_definitions_for_class(
        &self,
        class_name: &str,
    ) -> Vec<RelationEndPointDefinition> {
        let mut definitions: Vec<RelationEndPointDefinition> = self
            .relations
            .iter()
            .filter(|entry| entry.key().0 == class_name)
            .map(|entry| {
                entry
                    .value()
                    .end_point(&entry.key().0, &entry.key().1)
                    .cloned()
                    .expect("indexed end is part of its relation")
            })
            .collect();
        definitions.sort_by(|a, b| a.property_name.cmp(&b.property_name));
        definitions
    }

    /// Walk to the inheritance root of a class
    pub fn inheritance_root(&self, class_name: &str) -> String {
        let mut current = class_name.to_string();
        while let Some(base) = self.base_classes.get(&current) {
            current = base.value().clone();
        }
        current
    }

    /// Whether two classes share an inheritance root.
    ///
    /// Used by command construction: a supplied object is acceptable for an
    /// end-point when its class and the expected class share a root.
    pub fn same_inheritance_root(&self, a: &str, b: &str) -> bool {
        self.inheritance_root(a) == self.inheritance_root(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::definition::Cardinality;

    fn customer_orders() -> RelationDefinition {
        RelationDefinition::new(
            "Customer->Orders",
            RelationEndPointDefinition::real("Order", "Customer"),
            RelationEndPointDefinition::collection("Customer", "Orders"),
        )
    }

    #[test]
    fn test_register_and_lookup_both_ends() {
        let registry = MappingRegistry::new();
        registry.register(customer_orders()).unwrap();

        assert!(registry.is_relation_property("Order", "Customer"));
        assert!(registry.is_relation_property("Customer", "Orders"));
        assert!(!registry.is_relation_property("Customer", "Name"));

        let real = registry.end_point_definition("Order", "Customer").unwrap();
        assert!(!real.is_virtual);
        assert_eq!(real.cardinality, Cardinality::One);

        let opposite = registry.opposite_definition("Order", "Customer").unwrap();
        assert_eq!(opposite.property_name, "Orders");
        assert_eq!(opposite.cardinality, Cardinality::Many);
    }

    #[test]
    fn test_duplicate_property_registration_rejected() {
        let registry = MappingRegistry::new();
        registry.register(customer_orders()).unwrap();
        assert!(registry.register(customer_orders()).is_err());
    }

    #[test]
    fn test_missing_relation_is_mapping_error() {
        let registry = MappingRegistry::new();
        let err = registry.require_relation("Order", "Customer").unwrap_err();
        assert!(matches!(err, RelationError::Mapping(_)));
    }

    #[test]
    fn test_anonymous_end_not_indexed() {
        let registry = MappingRegistry::new();
        registry
            .register(RelationDefinition::new(
                "Client->ParentClient",
                RelationEndPointDefinition::real("Client", "ParentClient"),
                RelationEndPointDefinition::anonymous("Client"),
            ))
            .unwrap();

        assert!(registry.is_relation_property("Client", "ParentClient"));
        assert!(!registry.is_relation_property("Client", ""));
    }

    #[test]
    fn test_inheritance_root_walk() {
        let registry = MappingRegistry::new();
        registry.register_subclass("PremiumCustomer", "Customer");
        registry.register_subclass("Customer", "Company");

        assert_eq!(registry.inheritance_root("PremiumCustomer"), "Company");
        assert_eq!(registry.inheritance_root("Company"), "Company");
        assert!(registry.same_inheritance_root("PremiumCustomer", "Customer"));
        assert!(!registry.same_inheritance_root("PremiumCustomer", "Order"));
    }

    #[test]
    fn test_end_point_definitions_for_class() {
        let registry = MappingRegistry::new();
        registry.register(customer_orders()).unwrap();
        registry
            .register(RelationDefinition::new(
                "Order->OrderTicket",
                RelationEndPointDefinition::real("OrderTicket", "Order"),
                RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
            ))
            .unwrap();

        let order_ends = registry.end_point_definitions_for_class("Order");
        let properties: Vec<&str> = order_ends.iter().map(|e| e.property_name.as_str()).collect();
        assert_eq!(properties, vec!["Customer", "OrderTicket"]);
    }
}
