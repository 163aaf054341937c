//! Transaction Event Sink - relation change notifications
//!
//! Sinks receive "changing" notifications during a composite's `begin` phase
//! and "changed" notifications during `end`, mirrored in reverse order, so
//! listeners observe a LIFO nesting view of a bidirectional edit. All
//! methods default to no-ops; implementors override what they care about.

use crate::identity::{ObjectId, RelationEndPointId};

/// Receives relation change notifications from a transaction.
#[allow(unused_variables)]
pub trait RelationEventSink: Send + Sync {
    /// A relation value is about to change (fired in `begin`)
    fn relation_changing(
        &self,
        owner: &ObjectId,
        property_name: &str,
        old_value: Option<&ObjectId>,
        new_value: Option<&ObjectId>,
    ) {
    }

    /// A relation value has changed (fired in `end`, reverse order)
    fn relation_changed(
        &self,
        owner: &ObjectId,
        property_name: &str,
        old_value: Option<&ObjectId>,
        new_value: Option<&ObjectId>,
    ) {
    }

    /// A collection end-point's data was replaced wholesale (reorder or
    /// whole-collection swap); no per-item notifications accompany this
    fn collection_data_replaced(&self, end_point: &RelationEndPointId) {}

    /// A virtual end-point's completeness or synchronization state changed
    /// without a value-level relation change
    fn virtual_end_point_state_updated(&self, end_point: &RelationEndPointId, is_complete: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct SilentSink;

    impl RelationEventSink for SilentSink {}

    #[test]
    fn test_default_methods_are_no_ops() {
        let sink = SilentSink;
        let owner = ObjectId::new("Order");
        let end_point = RelationEndPointId::new(owner.clone(), "Customer");

        sink.relation_changing(&owner, "Customer", None, None);
        sink.relation_changed(&owner, "Customer", None, None);
        sink.collection_data_replaced(&end_point);
        sink.virtual_end_point_state_updated(&end_point, true);
    }
}
