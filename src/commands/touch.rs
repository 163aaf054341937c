//! Pass-through commands - touch and null modifications

use crate::commands::{check_same_transaction, DataCommand, ExpandedCommand};
use crate::error::RelationResult;
use crate::identity::RelationEndPointId;
use crate::transaction::{ClientTransaction, TransactionId};

/// Marks an end-point as touched without changing its value.
///
/// Used when an operation targets an end-point but leaves its data identical,
/// for example setting a related object to the value it already has. Touched
/// end-points participate in commit even though `has_changed` stays false.
#[derive(Debug, Clone)]
pub struct RelationEndPointTouchCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
}

impl RelationEndPointTouchCommand {
    pub fn new(tx: &ClientTransaction, end_point_id: RelationEndPointId) -> Self {
        Self {
            transaction_id: tx.id(),
            end_point_id,
        }
    }

    pub fn end_point_id(&self) -> &RelationEndPointId {
        &self.end_point_id
    }
}

impl DataCommand for RelationEndPointTouchCommand {
    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        tx.manager_mut().end_point_mut(&self.end_point_id)?.touch();
        Ok(())
    }

    fn expand(&self, _tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        Ok(ExpandedCommand::single(self.boxed_clone()))
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}

/// Stand-in for a modification of an end-point that does not exist in this
/// transaction, for example the collection of a previous owner that was never
/// loaded. Performs and notifies nothing.
#[derive(Debug, Clone, Default)]
pub struct NullEndPointModificationCommand;

impl NullEndPointModificationCommand {
    pub fn new() -> Self {
        Self
    }
}

impl DataCommand for NullEndPointModificationCommand {
    fn perform(&self, _tx: &mut ClientTransaction) -> RelationResult<()> {
        Ok(())
    }

    fn expand(&self, _tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        Ok(ExpandedCommand::single(self.boxed_clone()))
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}
