//! Collection end-point item commands - insert, remove, replace
//!
//! Each command mutates one slot of a complete collection end-point and
//! expands to the real end-point updates that keep the foreign-key side
//! consistent. The insert expansion follows the displacement order: the
//! moved object's real end-point changes first, then the object joins the
//! new collection, and only then does it leave the previous owner's
//! collection.

use crate::commands::{
    check_same_transaction, has_complete_data, DataCommand, ExpandedCommand,
    NullEndPointModificationCommand, ObjectEndPointSetCommand,
};
use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::transaction::{ClientTransaction, TransactionId};

fn require_collection_definition(
    tx: &ClientTransaction,
    end_point_id: &RelationEndPointId,
) -> RelationResult<crate::mapping::RelationEndPointDefinition> {
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
    Ok(definition)
}

fn check_item_class(
    tx: &ClientTransaction,
    end_point_id: &RelationEndPointId,
    item: &ObjectId,
) -> RelationResult<()> {
    let opposite = tx.mapping().opposite_definition(
        end_point_id.object_id().class_name(),
        end_point_id.property_name(),
    )?;
    if !tx
        .mapping()
        .same_inheritance_root(item.class_name(), &opposite.class_name)
    {
        return Err(RelationError::Consistency(format!(
            "Object '{}' cannot be placed in '{}': the relation expects class '{}'",
            item, end_point_id, opposite.class_name
        )));
    }
    Ok(())
}

/// The id of an item's real end-point for the relation behind a collection
fn item_real_end_point(
    tx: &ClientTransaction,
    collection_id: &RelationEndPointId,
    item: &ObjectId,
) -> RelationResult<RelationEndPointId> {
    let opposite = tx.mapping().opposite_definition(
        collection_id.object_id().class_name(),
        collection_id.property_name(),
    )?;
    Ok(RelationEndPointId::new(
        item.clone(),
        opposite.property_name,
    ))
}

/// Inserts an object into a complete collection end-point at a given index.
///
/// The inserted object's previous owner is captured at construction, before
/// any part of the expansion has run.
#[derive(Debug, Clone)]
pub struct CollectionEndPointInsertCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
    inserted: ObjectId,
    index: usize,
    previous_owner: Option<ObjectId>,
}

impl CollectionEndPointInsertCommand {
    /// `index: None` appends at the end of the collection.
    pub fn new(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        inserted: ObjectId,
        index: Option<usize>,
    ) -> RelationResult<Self> {
        require_collection_definition(tx, &end_point_id)?;
        check_item_class(tx, &end_point_id, &inserted)?;
        let collection = tx.manager().collection(&end_point_id)?;
        if collection.contains(&inserted) {
            return Err(RelationError::Usage(format!(
                "Object '{}' is already contained in '{}'",
                inserted, end_point_id
            )));
        }
        let len = collection.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(RelationError::Usage(format!(
                "Index {} is out of range for '{}' with {} items",
                index, end_point_id, len
            )));
        }
        let real_id = item_real_end_point(tx, &end_point_id, &inserted)?;
        let previous_owner = tx.manager().real(&real_id)?.opposite_object().cloned();
        Ok(Self {
            transaction_id: tx.id(),
            end_point_id,
            inserted,
            index,
            previous_owner,
        })
    }

    pub fn append(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        inserted: ObjectId,
    ) -> RelationResult<Self> {
        Self::new(tx, end_point_id, inserted, None)
    }

    pub fn inserted(&self) -> &ObjectId {
        &self.inserted
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl DataCommand for CollectionEndPointInsertCommand {
    fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changing(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            None,
            Some(&self.inserted),
        );
        Ok(())
    }

    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        let collection = tx.manager_mut().collection_mut(&self.end_point_id)?;
        collection.insert(self.index, self.inserted.clone())?;
        collection.touch();
        Ok(())
    }

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changed(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            None,
            Some(&self.inserted),
        );
        Ok(())
    }

    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        let owner = self.end_point_id.object_id().clone();
        let real_id = item_real_end_point(tx, &self.end_point_id, &self.inserted)?;
        let mut expanded = ExpandedCommand::new(vec![
            ObjectEndPointSetCommand::with_registration(tx, real_id, Some(owner))?,
            self.boxed_clone(),
        ]);
        if let Some(previous) = &self.previous_owner {
            let previous_collection = RelationEndPointId::new(
                previous.clone(),
                self.end_point_id.property_name().to_string(),
            );
            if has_complete_data(tx, &previous_collection) {
                expanded.push(Box::new(CollectionEndPointRemoveCommand::new(
                    tx,
                    previous_collection,
                    self.inserted.clone(),
                )?));
            } else {
                expanded.push(Box::new(NullEndPointModificationCommand::new()));
            }
        }
        Ok(expanded)
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}

/// Removes an object from a complete collection end-point.
#[derive(Debug, Clone)]
pub struct CollectionEndPointRemoveCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
    removed: ObjectId,
}

impl CollectionEndPointRemoveCommand {
    pub fn new(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        removed: ObjectId,
    ) -> RelationResult<Self> {
        require_collection_definition(tx, &end_point_id)?;
        let collection = tx.manager().collection(&end_point_id)?;
        if !collection.contains(&removed) {
            return Err(RelationError::Usage(format!(
                "Object '{}' is not contained in '{}'",
                removed, end_point_id
            )));
        }
        // the item's real end-point must be registered here for the
        // expansion to detach it
        let real_id = item_real_end_point(tx, &end_point_id, &removed)?;
        tx.manager().real(&real_id)?;
        Ok(Self {
            transaction_id: tx.id(),
            end_point_id,
            removed,
        })
    }

    pub fn removed(&self) -> &ObjectId {
        &self.removed
    }
}

impl DataCommand for CollectionEndPointRemoveCommand {
    fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changing(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            Some(&self.removed),
            None,
        );
        Ok(())
    }

    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        let collection = tx.manager_mut().collection_mut(&self.end_point_id)?;
        collection.remove(&self.removed)?;
        collection.touch();
        Ok(())
    }

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changed(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            Some(&self.removed),
            None,
        );
        Ok(())
    }

    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        let real_id = item_real_end_point(tx, &self.end_point_id, &self.removed)?;
        Ok(ExpandedCommand::new(vec![
            ObjectEndPointSetCommand::with_registration(tx, real_id, None)?,
            self.boxed_clone(),
        ]))
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}

/// Replaces the object at one index of a complete collection end-point.
#[derive(Debug, Clone)]
pub struct CollectionEndPointReplaceCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
    index: usize,
    replaced: ObjectId,
    replacement: ObjectId,
    replacement_previous_owner: Option<ObjectId>,
}

impl CollectionEndPointReplaceCommand {
    pub fn new(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        index: usize,
        replacement: ObjectId,
    ) -> RelationResult<Self> {
        require_collection_definition(tx, &end_point_id)?;
        check_item_class(tx, &end_point_id, &replacement)?;
        let collection = tx.manager().collection(&end_point_id)?;
        let items = collection.items()?;
        let replaced = items.get(index).cloned().ok_or_else(|| {
            RelationError::Usage(format!(
                "Index {} is out of range for '{}' with {} items",
                index,
                end_point_id,
                items.len()
            ))
        })?;
        if replaced != replacement && collection.contains(&replacement) {
            return Err(RelationError::Usage(format!(
                "Object '{}' is already contained in '{}'",
                replacement, end_point_id
            )));
        }
        let replaced_real = item_real_end_point(tx, &end_point_id, &replaced)?;
        tx.manager().real(&replaced_real)?;
        let replacement_real = item_real_end_point(tx, &end_point_id, &replacement)?;
        let replacement_previous_owner = tx
            .manager()
            .real(&replacement_real)?
            .opposite_object()
            .cloned();
        Ok(Self {
            transaction_id: tx.id(),
            end_point_id,
            index,
            replaced,
            replacement,
            replacement_previous_owner,
        })
    }

    pub fn replaced(&self) -> &ObjectId {
        &self.replaced
    }

    pub fn replacement(&self) -> &ObjectId {
        &self.replacement
    }

    /// Whether the replacement is the object already occupying the slot
    pub fn is_redundant(&self) -> bool {
        self.replaced == self.replacement
    }
}

impl DataCommand for CollectionEndPointReplaceCommand {
    fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changing(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            Some(&self.replaced),
            Some(&self.replacement),
        );
        Ok(())
    }

    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        let collection = tx.manager_mut().collection_mut(&self.end_point_id)?;
        collection.replace(self.index, self.replacement.clone())?;
        collection.touch();
        Ok(())
    }

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changed(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            Some(&self.replaced),
            Some(&self.replacement),
        );
        Ok(())
    }

    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        let owner = self.end_point_id.object_id().clone();
        let replaced_real = item_real_end_point(tx, &self.end_point_id, &self.replaced)?;
        let replacement_real = item_real_end_point(tx, &self.end_point_id, &self.replacement)?;
        let mut expanded = ExpandedCommand::new(vec![
            ObjectEndPointSetCommand::with_registration(tx, replaced_real, None)?,
            ObjectEndPointSetCommand::with_registration(tx, replacement_real, Some(owner))?,
            self.boxed_clone(),
        ]);
        if let Some(previous) = &self.replacement_previous_owner {
            let previous_collection = RelationEndPointId::new(
                previous.clone(),
                self.end_point_id.property_name().to_string(),
            );
            if has_complete_data(tx, &previous_collection) {
                expanded.push(Box::new(CollectionEndPointRemoveCommand::new(
                    tx,
                    previous_collection,
                    self.replacement.clone(),
                )?));
            } else {
                expanded.push(Box::new(NullEndPointModificationCommand::new()));
            }
        }
        Ok(expanded)
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}
