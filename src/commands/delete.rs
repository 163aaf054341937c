//! Silent end-point clear commands for object deletion
//!
//! When an object is deleted, its own end-points are emptied without change
//! notifications; only the opposite ends of its relations notify, through
//! the regular set and remove commands composed by the transaction.

use crate::commands::{check_same_transaction, DataCommand, ExpandedCommand};
use crate::endpoints::RelationEndPoint;
use crate::error::{RelationError, RelationResult};
use crate::identity::RelationEndPointId;
use crate::transaction::{ClientTransaction, TransactionId};

/// Nulls out a deleted object's single-object end-point, silently.
#[derive(Debug, Clone)]
pub struct ObjectEndPointDeleteCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
}

impl ObjectEndPointDeleteCommand {
    pub fn new(tx: &ClientTransaction, end_point_id: RelationEndPointId) -> Self {
        Self {
            transaction_id: tx.id(),
            end_point_id,
        }
    }
}

impl DataCommand for ObjectEndPointDeleteCommand {
    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        match tx.manager_mut().end_point_mut(&self.end_point_id)? {
            RelationEndPoint::Real(ep) => {
                ep.set_opposite_object(None);
                ep.touch();
            }
            RelationEndPoint::VirtualObject(ep) => {
                ep.set_opposite_object(None);
                ep.touch();
            }
            RelationEndPoint::Collection(_) => {
                return Err(RelationError::Usage(format!(
                    "End-point '{}' holds a collection",
                    self.end_point_id
                )))
            }
        }
        Ok(())
    }

    fn expand(&self, _tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        Ok(ExpandedCommand::single(self.boxed_clone()))
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}

/// Clears a deleted object's collection end-point, silently.
#[derive(Debug, Clone)]
pub struct CollectionEndPointDeleteCommand {
    transaction_id: TransactionId,
    end_point_id: RelationEndPointId,
}

impl CollectionEndPointDeleteCommand {
    pub fn new(tx: &ClientTransaction, end_point_id: RelationEndPointId) -> Self {
        Self {
            transaction_id: tx.id(),
            end_point_id,
        }
    }
}

impl DataCommand for CollectionEndPointDeleteCommand {
    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        check_same_transaction(self.transaction_id, tx)?;
        let collection = tx.manager_mut().collection_mut(&self.end_point_id)?;
        collection.clear();
        collection.touch();
        Ok(())
    }

    fn expand(&self, _tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        Ok(ExpandedCommand::single(self.boxed_clone()))
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}
