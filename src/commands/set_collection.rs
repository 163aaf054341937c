//! Whole-collection replacement command
//!
//! Replaces the entire contents of a collection end-point with the items of
//! a standalone collection by swapping the shared storage handle. The old
//! storage keeps the pre-replacement contents and lives on as a standalone
//! collection in the caller's hands.

use crate::collections::DomainObjectCollection;
use crate::commands::{
    check_same_transaction, has_complete_data, CollectionEndPointRemoveCommand, DataCommand,
    ExpandedCommand, NullEndPointModificationCommand, ObjectEndPointSetCommand,
    RelationEndPointTouchCommand,
};
use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::transaction::{ClientTransaction, TransactionId};

/// Swaps a collection end-point's storage for that of a standalone
/// collection.
///
/// Expands to detach commands for every removed item, move commands for
/// every added item, and touch commands for the items present in both
/// contents, so their real end-points participate in commit even though
/// their values did not change.
#[derive(Debug, Clone)]
pub struct CollectionEndPointSetCollectionCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
    new_collection: DomainObjectCollection,
    old_items: Vec<ObjectId>,
    new_items: Vec<ObjectId>,
}

impl CollectionEndPointSetCollectionCommand {
    pub fn new(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        new_collection: DomainObjectCollection,
    ) -> RelationResult<Self> {
        let definition = tx.mapping().end_point_definition(
            end_point_id.object_id().class_name(),
            end_point_id.property_name(),
        )?;
        if !definition.cardinality.is_collection() {
            return Err(RelationError::Usage(format!(
                "End-point '{}' does not hold a collection",
                end_point_id
            )));
        }
        if new_collection.is_associated() {
            return Err(RelationError::Usage(
                "The replacement collection is already associated with an end-point; \
                 pass a standalone collection"
                    .to_string(),
            ));
        }
        let opposite = tx.mapping().opposite_definition(
            end_point_id.object_id().class_name(),
            end_point_id.property_name(),
        )?;
        let new_items = new_collection.items();
        for item in &new_items {
            if !tx
                .mapping()
                .same_inheritance_root(item.class_name(), &opposite.class_name)
            {
                return Err(RelationError::Consistency(format!(
                    "Object '{}' cannot be placed in '{}': the relation expects class '{}'",
                    item, end_point_id, opposite.class_name
                )));
            }
            let real_id = RelationEndPointId::new(item.clone(), opposite.property_name.clone());
            tx.manager().real(&real_id)?;
        }
        let old_items = tx.manager().collection(&end_point_id)?.items()?;
        Ok(Self {
            transaction_id: tx.id(),
            end_point_id,
            new_collection,
            old_items,
            new_items,
        })
    }

    pub fn end_point_id(&self) -> &RelationEndPointId {
        &self.end_point_id
    }
}

impl DataCommand for CollectionEndPointSetCollectionCommand {
    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        let collection = tx.manager_mut().collection_mut(&self.end_point_id)?;
        collection.replace_storage(self.new_collection.storage());
        collection.touch();
        Ok(())
    }

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_collection_data_replaced(&self.end_point_id);
        Ok(())
    }

    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        let owner = self.end_point_id.object_id().clone();
        let opposite = tx.mapping().opposite_definition(
            self.end_point_id.object_id().class_name(),
            self.end_point_id.property_name(),
        )?;
        let mut expanded = ExpandedCommand::default();

        for removed in &self.old_items {
            if !self.new_items.contains(removed) {
                let real_id =
                    RelationEndPointId::new(removed.clone(), opposite.property_name.clone());
                expanded.push(ObjectEndPointSetCommand::with_registration(
                    tx, real_id, None,
                )?);
            }
        }
        for added in &self.new_items {
            if !self.old_items.contains(added) {
                let real_id =
                    RelationEndPointId::new(added.clone(), opposite.property_name.clone());
                let previous_owner = tx.manager().real(&real_id)?.opposite_object().cloned();
                if let Some(previous) = previous_owner.filter(|p| *p != owner) {
                    let previous_collection = RelationEndPointId::new(
                        previous,
                        self.end_point_id.property_name().to_string(),
                    );
                    if has_complete_data(tx, &previous_collection) {
                        expanded.push(Box::new(CollectionEndPointRemoveCommand::new(
                            tx,
                            previous_collection,
                            added.clone(),
                        )?));
                    } else {
                        expanded.push(Box::new(NullEndPointModificationCommand::new()));
                    }
                }
                expanded.push(ObjectEndPointSetCommand::with_registration(
                    tx,
                    real_id,
                    Some(owner.clone()),
                )?);
            }
        }
        for kept in &self.new_items {
            if self.old_items.contains(kept) {
                let real_id =
                    RelationEndPointId::new(kept.clone(), opposite.property_name.clone());
                expanded.push(Box::new(RelationEndPointTouchCommand::new(tx, real_id)));
            }
        }
        expanded.push(self.boxed_clone());
        Ok(expanded)
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}
