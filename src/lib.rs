//! # elif-relations: Bidirectional Relation Consistency for elif.rs
//!
//! Transaction-scoped tracking of bidirectional object relations: every
//! relation has two end-points, and every edit goes through a command that
//! expands to the mutations keeping both ends consistent. Virtual end-points
//! load lazily through a pluggable storage collaborator, collections share
//! storage between end-point and application handle, and transactions nest
//! with snapshot isolation.

pub mod collections;
pub mod commands;
pub mod eager;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod identity;
pub mod loader;
pub mod manager;
pub mod mapping;
pub mod transaction;

// Re-export core types
pub use collections::DomainObjectCollection;
pub use commands::{DataCommand, ExpandedCommand};
pub use eager::{register_fetched_relations, EagerFetchResult};
pub use endpoints::{
    CollectionEndPoint, CompletionState, RealObjectEndPoint, RelationEndPoint,
    VirtualObjectEndPoint,
};
pub use error::{RelationError, RelationResult};
pub use events::RelationEventSink;
pub use identity::{ObjectId, RelationEndPointId};
pub use loader::{InMemoryRelationSource, RelationLoader};
pub use manager::RelationEndPointManager;
pub use mapping::{
    Cardinality, MappingRegistry, RelationDefinition, RelationEndPointDefinition,
};
pub use transaction::{
    current_transaction_id, ClientTransaction, TransactionId, TransactionScope,
};
