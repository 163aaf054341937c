//! Registration decorator for real end-point modifications
//!
//! Whenever a real (foreign-key) end-point changes value, the owning object
//! must be unregistered from the old opposite end's in-memory index and
//! registered with the new one, so opposite ends that load later still see
//! it. The decorator keeps that bookkeeping out of the value commands
//! themselves.

use crate::commands::{DataCommand, ExpandedCommand};
use crate::error::RelationResult;
use crate::identity::{ObjectId, RelationEndPointId};
use crate::transaction::ClientTransaction;

/// Wraps a command that changes a real end-point's value and maintains the
/// opposite-end indexes around the inner `perform`.
///
/// Both index operations are idempotent, so re-wrapping an expansion with
/// the same decoration is harmless.
#[derive(Debug, Clone)]
pub struct RealObjectEndPointRegistrationDecorator {
    inner: Box<dyn DataCommand>,
    real_end_point_id: RelationEndPointId,
    old_opposite: Option<ObjectId>,
    new_opposite: Option<ObjectId>,
}

impl RealObjectEndPointRegistrationDecorator {
    pub fn new(
        inner: Box<dyn DataCommand>,
        real_end_point_id: RelationEndPointId,
        old_opposite: Option<ObjectId>,
        new_opposite: Option<ObjectId>,
    ) -> Self {
        Self {
            inner,
            real_end_point_id,
            old_opposite,
            new_opposite,
        }
    }
}

impl DataCommand for RealObjectEndPointRegistrationDecorator {
    fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        self.inner.begin(tx)
    }

    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        let member = self.real_end_point_id.object_id().clone();
        if let Some(old) = &self.old_opposite {
            tx.manager_mut()
                .unregister_opposite(&self.real_end_point_id, old, &member)?;
        }
        self.inner.perform(tx)?;
        if let Some(new) = &self.new_opposite {
            tx.manager_mut()
                .register_opposite_pending(&self.real_end_point_id, new, &member)?;
        }
        Ok(())
    }

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        self.inner.end(tx)
    }

    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
        let real_end_point_id = self.real_end_point_id.clone();
        let old_opposite = self.old_opposite.clone();
        let new_opposite = self.new_opposite.clone();
        Ok(self.inner.expand(tx)?.decorate_each(move |command| {
            Box::new(RealObjectEndPointRegistrationDecorator::new(
                command,
                real_end_point_id.clone(),
                old_opposite.clone(),
                new_opposite.clone(),
            ))
        }))
    }

    fn boxed_clone(&self) -> Box<dyn DataCommand> {
        Box::new(self.clone())
    }
}
