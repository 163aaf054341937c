//! Object end-point set command
//!
//! Sets the single related object of a real or virtual-object end-point, and
//! expands to the commands that keep the other side of the relation in step:
//! membership moves between collections for one-to-many relations, and the
//! previous partners of both objects are detached for one-to-one relations.

use crate::commands::{
    check_same_transaction, has_complete_data, CollectionEndPointInsertCommand,
    CollectionEndPointRemoveCommand, DataCommand, ExpandedCommand, NullEndPointModificationCommand,
    RealObjectEndPointRegistrationDecorator,
};
use crate::endpoints::RelationEndPoint;
use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::transaction::{ClientTransaction, TransactionId};

/// Replaces the value of a single-object end-point.
///
/// Old and new values are captured at construction, so the command carries
/// the full pre-image it needs for notifications and expansion.
#[derive(Debug, Clone)]
pub struct ObjectEndPointSetCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
    old_value: Option<ObjectId>,
    new_value: Option<ObjectId>,
}

impl ObjectEndPointSetCommand {
    /// Build a set command against the end-point's current data.
    ///
    /// The end-point must be registered and complete in this transaction,
    /// and the new value's class must belong to the relation's target
    /// inheritance hierarchy.
    pub fn new(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        new_value: Option<ObjectId>,
    ) -> RelationResult<Self> {
        let mapping = tx.mapping();
        let definition = mapping.end_point_definition(
            end_point_id.object_id().class_name(),
            end_point_id.property_name(),
        )?;
        if definition.cardinality.is_collection() {
            return Err(RelationError::Usage(format!(
                "End-point '{}' holds a collection; use the collection operations instead",
                end_point_id
            )));
        }
        if let Some(new) = &new_value {
            let opposite = mapping.opposite_definition(
                end_point_id.object_id().class_name(),
                end_point_id.property_name(),
            )?;
            if !mapping.same_inheritance_root(new.class_name(), &opposite.class_name) {
                return Err(RelationError::Consistency(format!(
                    "Object '{}' cannot be assigned to '{}': the relation expects class '{}'",
                    new, end_point_id, opposite.class_name
                )));
            }
        }
        let old_value = match tx.manager().end_point(&end_point_id)? {
            RelationEndPoint::Real(ep) => ep.opposite_object().cloned(),
            RelationEndPoint::VirtualObject(ep) => ep.opposite_object()?,
            RelationEndPoint::Collection(_) => {
                return Err(RelationError::Usage(format!(
                    "End-point '{}' holds a collection; use the collection operations instead",
                    end_point_id
                )))
            }
        };
        Ok(Self {
            transaction_id: tx.id(),
            end_point_id,
            old_value,
            new_value,
        })
    }

    /// Build the command and wrap it in the opposite-index registration
    /// decorator when the end-point is the foreign-key side.
    pub(crate) fn with_registration(
        tx: &ClientTransaction,
        end_point_id: RelationEndPointId,
        new_value: Option<ObjectId>,
    ) -> RelationResult<Box<dyn DataCommand>> {
        let definition = tx.mapping().end_point_definition(
            end_point_id.object_id().class_name(),
            end_point_id.property_name(),
        )?;
        let command = Self::new(tx, end_point_id.clone(), new_value.clone())?;
        if definition.is_virtual {
            Ok(Box::new(command))
        } else {
            let old_value = command.old_value.clone();
            Ok(Box::new(RealObjectEndPointRegistrationDecorator::new(
                Box::new(command),
                end_point_id,
                old_value,
                new_value,
            )))
        }
    }

    pub fn end_point_id(&self) -> &RelationEndPointId {
        &self.end_point_id
    }

    pub fn old_value(&self) -> Option<&ObjectId> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> Option<&ObjectId> {
        self.new_value.as_ref()
    }

    /// Whether the command would leave the end-point's value unchanged
    pub fn is_redundant(&self) -> bool {
        self.old_value == self.new_value
    }
}

impl DataCommand for ObjectEndPointSetCommand {
    fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changing(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            self.old_value.as_ref(),
            self.new_value.as_ref(),
        );
        Ok(())
    }

    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        match tx.manager_mut().end_point_mut(&self.end_point_id)? {
            RelationEndPoint::Real(ep) => {
                ep.set_opposite_object(self.new_value.clone());
                ep.touch();
            }
            RelationEndPoint::VirtualObject(ep) => {
                ep.set_opposite_object(self.new_value.clone());
                ep.touch();
            }
            RelationEndPoint::Collection(_) => {
                return Err(RelationError::Usage(format!(
                    "End-point '{}' holds a collection; use the collection operations instead",
                    self.end_point_id
                )))
            }
        }
        Ok(())
    }

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        tx.notify_relation_changed(
            self.end_point_id.object_id(),
            self.end_point_id.property_name(),
            self.old_value.as_ref(),
            self.new_value.as_ref(),
        );
        Ok(())
    }

    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        let mapping = tx.mapping();
        let own_definition = mapping.end_point_definition(
            self.end_point_id.object_id().class_name(),
            self.end_point_id.property_name(),
        )?;
        let opposite = mapping.opposite_definition(
            self.end_point_id.object_id().class_name(),
            self.end_point_id.property_name(),
        )?;
        let owner = self.end_point_id.object_id().clone();

        let self_command: Box<dyn DataCommand> = if own_definition.is_virtual {
            self.boxed_clone()
        } else {
            Box::new(RealObjectEndPointRegistrationDecorator::new(
                self.boxed_clone(),
                self.end_point_id.clone(),
                self.old_value.clone(),
                self.new_value.clone(),
            ))
        };
        let mut expanded = ExpandedCommand::single(self_command);

        if opposite.is_anonymous {
            return Ok(expanded);
        }

        if opposite.cardinality.is_collection() {
            // one-to-many: detach from the old owner's collection, then
            // attach to the new owner's
            if let Some(old) = &self.old_value {
                let old_collection =
                    RelationEndPointId::new(old.clone(), opposite.property_name.clone());
                if has_complete_data(tx, &old_collection) {
                    expanded.push(Box::new(CollectionEndPointRemoveCommand::new(
                        tx,
                        old_collection,
                        owner.clone(),
                    )?));
                } else {
                    expanded.push(Box::new(NullEndPointModificationCommand::new()));
                }
            }
            if let Some(new) = &self.new_value {
                let new_collection =
                    RelationEndPointId::new(new.clone(), opposite.property_name.clone());
                if has_complete_data(tx, &new_collection) {
                    expanded.push(Box::new(CollectionEndPointInsertCommand::append(
                        tx,
                        new_collection,
                        owner.clone(),
                    )?));
                }
            }
        } else {
            // one-to-one: detach the old partner, evict the new partner's
            // previous partner, then attach the new partner
            if let Some(old) = &self.old_value {
                let old_end =
                    RelationEndPointId::new(old.clone(), opposite.property_name.clone());
                if has_complete_data(tx, &old_end) {
                    expanded.push(ObjectEndPointSetCommand::with_registration(
                        tx, old_end, None,
                    )?);
                }
            }
            if let Some(new) = &self.new_value {
                let new_end =
                    RelationEndPointId::new(new.clone(), opposite.property_name.clone());
                if has_complete_data(tx, &new_end) {
                    let previous_partner = match tx.manager().end_point(&new_end)? {
                        RelationEndPoint::Real(ep) => ep.opposite_object().cloned(),
                        RelationEndPoint::VirtualObject(ep) => ep.opposite_object()?,
                        RelationEndPoint::Collection(_) => None,
                    };
                    if let Some(previous) = previous_partner.filter(|p| *p != owner) {
                        let previous_end = RelationEndPointId::new(
                            previous,
                            self.end_point_id.property_name().to_string(),
                        );
                        if has_complete_data(tx, &previous_end) {
                            expanded.push(ObjectEndPointSetCommand::with_registration(
                                tx,
                                previous_end,
                                None,
                            )?);
                        }
                    }
                    expanded.push(ObjectEndPointSetCommand::with_registration(
                        tx,
                        new_end,
                        Some(owner),
                    )?);
                }
            }
        }
        Ok(expanded)
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}
