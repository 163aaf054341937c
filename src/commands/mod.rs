//! Data Management Commands - atomic relation mutations with expansion
//!
//! Every logical relation edit is a command with a `begin`/`perform`/`end`
//! protocol. Commands are stateless once constructed: old value, new value,
//! and index are captured at construction time, so `perform` is a pure
//! side-effecting step with no decision logic. `expand` turns a one-sided
//! edit into the ordered composite of commands that keeps both relation ends
//! consistent.

pub mod collection_ops;
pub mod decorators;
pub mod delete;
pub mod object_set;
pub mod set_collection;
pub mod touch;

pub use collection_ops::{
    CollectionEndPointInsertCommand, CollectionEndPointRemoveCommand,
    CollectionEndPointReplaceCommand,
};
pub use decorators::RealObjectEndPointRegistrationDecorator;
pub use delete::{CollectionEndPointDeleteCommand, ObjectEndPointDeleteCommand};
pub use object_set::ObjectEndPointSetCommand;
pub use set_collection::CollectionEndPointSetCollectionCommand;
pub use touch::{NullEndPointModificationCommand, RelationEndPointTouchCommand};

use std::fmt::Debug;

use tracing::trace;

use crate::error::{RelationError, RelationResult};
use crate::transaction::{ClientTransaction, TransactionId};

/// A deferred, composable unit of relation mutation.
///
/// `begin` raises "about to change" notifications, `perform` applies the
/// mutation plus an unconditional touch of the modified end-point, `end`
/// raises "changed" notifications. Commands explicitly documented as silent
/// (the delete commands) leave `begin`/`end` empty.
pub trait DataCommand: Debug {
    fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        let _ = tx;
        Ok(())
    }

    fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()>;

    fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        let _ = tx;
        Ok(())
    }

    /// Expand this command into the full ordered set of commands needed to
    /// keep both relation ends consistent
    fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand>;

    /// Clone behind the trait object, for composing expansions
    fn boxed_clone(&self) -> Box<dyn DataCommand>;
}

impl Clone for Box<dyn DataCommand> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Ordered, flattenable composite representing one logical bidirectional
/// edit.
///
/// Sub-commands execute strictly in construction order for `begin` and
/// `perform`, and in reverse order for `end`, so listeners observe a LIFO
/// nesting view of the composite.
#[derive(Debug, Clone, Default)]
pub struct ExpandedCommand {
    commands: Vec<Box<dyn DataCommand>>,
}

impl ExpandedCommand {
    pub fn new(commands: Vec<Box<dyn DataCommand>>) -> Self {
        Self { commands }
    }

    pub fn single(command: Box<dyn DataCommand>) -> Self {
        Self {
            commands: vec![command],
        }
    }

    pub fn push(&mut self, command: Box<dyn DataCommand>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Box<dyn DataCommand>] {
        &self.commands
    }

    pub fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        for command in &self.commands {
            command.begin(tx)?;
        }
        Ok(())
    }

    pub fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        for command in &self.commands {
            trace!(command = ?command, "performing relation command");
            command.perform(tx)?;
        }
        Ok(())
    }

    pub fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        for command in self.commands.iter().rev() {
            command.end(tx)?;
        }
        Ok(())
    }

    /// Drive the full protocol: `begin` in order, `perform` in order, `end`
    /// in reverse order
    pub fn notify_and_perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
        self.begin(tx)?;
        self.perform(tx)?;
        self.end(tx)
    }

    /// Re-wrap every element of this composite with an extra decoration.
    ///
    /// Decorating an already-expanded command must wrap each element, not
    /// just the outer composite.
    pub fn decorate_each<F>(self, decorate: F) -> ExpandedCommand
    where
        F: Fn(Box<dyn DataCommand>) -> Box<dyn DataCommand>,
    {
        ExpandedCommand {
            commands: self.commands.into_iter().map(decorate).collect(),
        }
    }
}

/// Whether an end-point is materialized with complete data, without
/// triggering a load. Incomplete ends are skipped by expansions; the
/// registration indexes reconcile them when they load.
pub(crate) fn has_complete_data(
    tx: &ClientTransaction,
    id: &crate::identity::RelationEndPointId,
) -> bool {
    tx.manager()
        .get_relation_end_point_without_loading(id)
        .map(|end_point| end_point.is_data_complete())
        .unwrap_or(false)
}

/// Commands capture their owning transaction at construction time and refuse
/// to run anywhere else.
pub(crate) fn check_same_transaction(
    expected: TransactionId,
    tx: &ClientTransaction,
) -> RelationResult<()> {
    if tx.id() != expected {
        return Err(RelationError::Transaction(format!(
            "Command was constructed for transaction '{}' but is executing in '{}'",
            expected,
            tx.id()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryRelationSource;
    use crate::mapping::MappingRegistry;
    use std::sync::{Arc, Mutex};

    fn empty_transaction() -> ClientTransaction {
        ClientTransaction::new(
            Arc::new(MappingRegistry::new()),
            Arc::new(InMemoryRelationSource::new()),
        )
    }

    #[derive(Debug, Clone)]
    struct ProbeCommand {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DataCommand for ProbeCommand {
        fn begin(&self, _tx: &mut ClientTransaction) -> RelationResult<()> {
            self.log.lock().unwrap().push(format!("begin {}", self.name));
            Ok(())
        }

        fn perform(&self, _tx: &mut ClientTransaction) -> RelationResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("perform {}", self.name));
            Ok(())
        }

        fn end(&self, _tx: &mut ClientTransaction) -> RelationResult<()> {
            self.log.lock().unwrap().push(format!("end {}", self.name));
            Ok(())
        }

        fn expand(&self, _tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
            Ok(ExpandedCommand::single(self.boxed_clone()))
        }

        fn boxed_clone(&self) -> Box<dyn DataCommand> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_composite_runs_begin_and_perform_forward_end_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let composite = ExpandedCommand::new(vec![
            Box::new(ProbeCommand {
                name: "a",
                log: log.clone(),
            }),
            Box::new(ProbeCommand {
                name: "b",
                log: log.clone(),
            }),
        ]);

        let mut tx = empty_transaction();
        composite.notify_and_perform(&mut tx).unwrap();

        let expected: Vec<String> = ["begin a", "begin b", "perform a", "perform b", "end b", "end a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[derive(Debug, Clone)]
    struct CountingDecorator {
        inner: Box<dyn DataCommand>,
        performs: Arc<Mutex<usize>>,
    }

    impl DataCommand for CountingDecorator {
        fn begin(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
            self.inner.begin(tx)
        }

        fn perform(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
            *self.performs.lock().unwrap() += 1;
            self.inner.perform(tx)
        }

        fn end(&self, tx: &mut ClientTransaction) -> RelationResult<()> {
            self.inner.end(tx)
        }

        fn expand(&self, tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
            self.inner.expand(tx)
        }

        fn boxed_clone(&self) -> Box<dyn DataCommand> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_decorate_each_wraps_every_element() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let composite = ExpandedCommand::new(vec![
            Box::new(ProbeCommand {
                name: "a",
                log: log.clone(),
            }),
            Box::new(ProbeCommand {
                name: "b",
                log: log.clone(),
            }),
            Box::new(NullEndPointModificationCommand::new()),
        ]);

        let performs = Arc::new(Mutex::new(0usize));
        let counter = performs.clone();
        let decorated = composite.decorate_each(move |command| {
            Box::new(CountingDecorator {
                inner: command,
                performs: counter.clone(),
            })
        });
        assert_eq!(decorated.len(), 3);

        let mut tx = empty_transaction();
        decorated.perform(&mut tx).unwrap();
        assert_eq!(*performs.lock().unwrap(), 3);
    }

    #[test]
    fn test_perform_stops_at_first_error() {
        #[derive(Debug, Clone)]
        struct FailingCommand;

        impl DataCommand for FailingCommand {
            fn perform(&self, _tx: &mut ClientTransaction) -> RelationResult<()> {
                Err(RelationError::Usage("boom".to_string()))
            }

            fn expand(&self, _tx: &ClientTransaction) -> RelationResult<ExpandedCommand> {
                Ok(ExpandedCommand::single(self.boxed_clone()))
            }

            fn boxed_clone(&self) -> Box<dyn DataCommand> {
                Box::new(self.clone())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let composite = ExpandedCommand::new(vec![
            Box::new(FailingCommand),
            Box::new(ProbeCommand {
                name: "after",
                log: log.clone(),
            }),
        ]);

        let mut tx = empty_transaction();
        assert!(composite.perform(&mut tx).is_err());
        assert!(log.lock().unwrap().is_empty());
    }
}
