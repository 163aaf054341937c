//! Relation Mapping - static relation metadata and its registry
//!
//! The mapping collaborator: relation definitions (cardinality, virtuality,
//! mandatory flag, opposite end) keyed by class/property, plus the
//! inheritance-root data the expansion algorithm uses to validate that a
//! supplied object belongs to the class an end-point expects.

pub mod definition;
pub mod registry;

pub use definition::{Cardinality, RelationDefinition, RelationEndPointDefinition};
pub use registry::MappingRegistry;
