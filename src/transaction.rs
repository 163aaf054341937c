//! Client Transaction - the application-facing unit of work
//!
//! A transaction owns one end-point registry and exposes the relation
//! operations the application calls: reading related objects, setting single
//! relations, editing collections, deleting objects. Every mutation goes
//! through command expansion, so both ends of a bidirectional relation stay
//! consistent and event sinks see the full picture.
//!
//! Transactions nest: a sub-transaction forks a detached snapshot of the
//! parent's end-points, edits it in isolation, and either folds its net
//! changes back into the parent or is simply dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::collections::DomainObjectCollection;
use crate::commands::{
    CollectionEndPointDeleteCommand, CollectionEndPointInsertCommand,
    CollectionEndPointRemoveCommand, CollectionEndPointReplaceCommand,
    CollectionEndPointSetCollectionCommand, DataCommand, ExpandedCommand,
    ObjectEndPointDeleteCommand, ObjectEndPointSetCommand,
    RealObjectEndPointRegistrationDecorator,
};
use crate::endpoints::RelationEndPoint;
use crate::error::{RelationError, RelationResult};
use crate::events::RelationEventSink;
use crate::identity::{ObjectId, RelationEndPointId};
use crate::loader::RelationLoader;
use crate::manager::RelationEndPointManager;
use crate::mapping::MappingRegistry;

pub type TransactionId = Uuid;

thread_local! {
    static AMBIENT: RefCell<Vec<TransactionId>> = RefCell::new(Vec::new());
}

/// The innermost ambient transaction on this thread, if any
pub fn current_transaction_id() -> Option<TransactionId> {
    AMBIENT.with(|stack| stack.borrow().last().copied())
}

/// RAII guard making a transaction the ambient one on the current thread.
///
/// Scopes form a stack; dropping a guard out of order removes its entry
/// wherever it sits and logs a warning.
#[must_use = "dropping the scope immediately deactivates the transaction"]
pub struct TransactionScope {
    id: TransactionId,
}

impl TransactionScope {
    pub fn enter(tx: &ClientTransaction) -> Self {
        AMBIENT.with(|stack| stack.borrow_mut().push(tx.id()));
        Self { id: tx.id() }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        AMBIENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.last() == Some(&self.id) {
                stack.pop();
            } else {
                warn!(transaction = %self.id, "transaction scope dropped out of order");
                stack.retain(|id| *id != self.id);
            }
        });
    }
}

/// A unit of work over the relation graph.
pub struct ClientTransaction {
    id: TransactionId,
    parent_id: Option<TransactionId>,
    mapping: Arc<MappingRegistry>,
    manager: RelationEndPointManager,
    event_sinks: Vec<Arc<dyn RelationEventSink>>,
}

impl fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .finish()
    }
}

impl ClientTransaction {
    pub fn new(mapping: Arc<MappingRegistry>, loader: Arc<dyn RelationLoader>) -> Self {
        let id = Uuid::new_v4();
        debug!(transaction = %id, "creating root client transaction");
        Self {
            id,
            parent_id: None,
            manager: RelationEndPointManager::new(Arc::clone(&mapping), loader),
            mapping,
            event_sinks: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn parent_id(&self) -> Option<TransactionId> {
        self.parent_id
    }

    pub fn mapping(&self) -> &Arc<MappingRegistry> {
        &self.mapping
    }

    pub fn manager(&self) -> &RelationEndPointManager {
        &self.manager
    }

    pub(crate) fn manager_mut(&mut self) -> &mut RelationEndPointManager {
        &mut self.manager
    }

    pub fn add_event_sink(&mut self, sink: Arc<dyn RelationEventSink>) {
        self.event_sinks.push(sink);
    }

    // ---- event dispatch -------------------------------------------------

    pub(crate) fn notify_relation_changing(
        &self,
        owner: &ObjectId,
        property_name: &str,
        old_value: Option<&ObjectId>,
        new_value: Option<&ObjectId>,
    ) {
        for sink in &self.event_sinks {
            sink.relation_changing(owner, property_name, old_value, new_value);
        }
    }

    pub(crate) fn notify_relation_changed(
        &self,
        owner: &ObjectId,
        property_name: &str,
        old_value: Option<&ObjectId>,
        new_value: Option<&ObjectId>,
    ) {
        for sink in &self.event_sinks {
            sink.relation_changed(owner, property_name, old_value, new_value);
        }
    }

    pub(crate) fn notify_collection_data_replaced(&self, end_point: &RelationEndPointId) {
        for sink in &self.event_sinks {
            sink.collection_data_replaced(end_point);
        }
    }

    pub(crate) fn notify_virtual_end_point_state_updated(
        &self,
        end_point: &RelationEndPointId,
        is_complete: bool,
    ) {
        for sink in &self.event_sinks {
            sink.virtual_end_point_state_updated(end_point, is_complete);
        }
    }

    // ---- object registration and loading --------------------------------

    /// Register the real end-point of an object row loaded into this
    /// transaction, together with its foreign-key value
    pub fn register_real_object_end_point(
        &mut self,
        id: RelationEndPointId,
        foreign_key: Option<ObjectId>,
    ) -> RelationResult<()> {
        self.manager.register_real_object_end_point(id, foreign_key)
    }

    /// Register every real end-point of a freshly loaded object row.
    ///
    /// Real relation properties not mentioned in `foreign_keys` are
    /// registered as unset; a key naming anything but a real relation
    /// property of the object's class is a usage error.
    pub fn register_loaded_object<I, S>(
        &mut self,
        object: &ObjectId,
        foreign_keys: I,
    ) -> RelationResult<()>
    where
        I: IntoIterator<Item = (S, Option<ObjectId>)>,
        S: Into<String>,
    {
        let mut provided: HashMap<String, Option<ObjectId>> = foreign_keys
            .into_iter()
            .map(|(property, value)| (property.into(), value))
            .collect();
        let definitions = self
            .mapping
            .end_point_definitions_for_class(object.class_name());
        if let Some(stray) = provided
            .keys()
            .find(|key| {
                !definitions
                    .iter()
                    .any(|d| !d.is_virtual && d.property_name == **key)
            })
            .cloned()
        {
            return Err(RelationError::Usage(format!(
                "'{}.{}' is not a real relation property",
                object.class_name(),
                stray
            )));
        }
        for definition in definitions {
            if definition.is_virtual {
                continue;
            }
            let value = provided.remove(&definition.property_name).unwrap_or(None);
            self.manager.register_real_object_end_point(
                RelationEndPointId::new(object.clone(), definition.property_name),
                value,
            )?;
        }
        Ok(())
    }

    /// Make an end-point's data complete, loading it if needed. Returns true
    /// when a load actually happened.
    pub fn ensure_data_complete(&mut self, id: &RelationEndPointId) -> RelationResult<bool> {
        let loaded = self.manager.ensure_data_complete(id)?;
        if loaded {
            self.notify_virtual_end_point_state_updated(id, true);
        }
        Ok(loaded)
    }

    // ---- reads ----------------------------------------------------------

    /// The single object related through a real or virtual-object end-point
    pub fn get_related_object(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<Option<ObjectId>> {
        self.ensure_data_complete(id)?;
        self.current_related_object(id)
    }

    /// The items of a collection end-point, in order
    pub fn get_related_objects(&mut self, id: &RelationEndPointId) -> RelationResult<Vec<ObjectId>> {
        self.ensure_data_complete(id)?;
        self.manager.collection(id)?.items()
    }

    /// A collection handle associated with the end-point. The handle shares
    /// storage with the end-point: reads always see current data, writes
    /// must go through this transaction.
    pub fn get_collection(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<DomainObjectCollection> {
        self.ensure_data_complete(id)?;
        Ok(DomainObjectCollection::from_storage(
            self.manager.collection(id)?.storage_handle(),
        ))
    }

    fn current_related_object(
        &self,
        id: &RelationEndPointId,
    ) -> RelationResult<Option<ObjectId>> {
        match self.manager.end_point(id)? {
            RelationEndPoint::Real(ep) => Ok(ep.opposite_object().cloned()),
            RelationEndPoint::VirtualObject(ep) => ep.opposite_object(),
            RelationEndPoint::Collection(_) => Err(RelationError::Usage(format!(
                "End-point '{}' holds a collection; use get_related_objects",
                id
            ))),
        }
    }

    // ---- single-object writes -------------------------------------------

    /// Set the related object of a real or virtual-object end-point.
    ///
    /// Setting the value it already has touches the end-point and returns
    /// without notifications.
    pub fn set_related_object(
        &mut self,
        id: &RelationEndPointId,
        new_value: Option<ObjectId>,
    ) -> RelationResult<()> {
        self.ensure_data_complete(id)?;
        let opposite = self
            .mapping
            .opposite_definition(id.object_id().class_name(), id.property_name())?;

        // one-to-one partners must be materialized before expansion so
        // their detach commands can be built
        if !opposite.is_anonymous && !opposite.cardinality.is_collection() {
            let old_value = self.current_related_object(id)?;
            for partner in old_value.iter().chain(new_value.iter()) {
                let partner_end =
                    RelationEndPointId::new(partner.clone(), opposite.property_name.clone());
                if opposite.is_virtual {
                    self.ensure_data_complete(&partner_end)?;
                } else if *partner != *id.object_id()
                    && new_value.as_ref() == Some(partner)
                {
                    // the new partner's foreign-key side must already live
                    // in this transaction
                    self.manager.end_point(&partner_end)?;
                }
            }
        }

        let command = ObjectEndPointSetCommand::new(self, id.clone(), new_value)?;
        if command.is_redundant() {
            self.manager.end_point_mut(id)?.touch();
            return Ok(());
        }
        self.run(&command)
    }

    // ---- collection writes ----------------------------------------------

    /// Insert an object into a collection end-point; `index: None` appends.
    pub fn insert_related_object(
        &mut self,
        collection_id: &RelationEndPointId,
        object: ObjectId,
        index: Option<usize>,
    ) -> RelationResult<()> {
        self.ensure_data_complete(collection_id)?;
        let command =
            CollectionEndPointInsertCommand::new(self, collection_id.clone(), object, index)?;
        self.run(&command)
    }

    /// Remove an object from a collection end-point.
    pub fn remove_related_object(
        &mut self,
        collection_id: &RelationEndPointId,
        object: ObjectId,
    ) -> RelationResult<()> {
        self.ensure_data_complete(collection_id)?;
        let command = CollectionEndPointRemoveCommand::new(self, collection_id.clone(), object)?;
        self.run(&command)
    }

    /// Replace the object at one index of a collection end-point.
    ///
    /// Replacing a slot with the object already occupying it touches the
    /// end-point and the item's real end-point, without notifications.
    pub fn replace_related_object(
        &mut self,
        collection_id: &RelationEndPointId,
        index: usize,
        replacement: ObjectId,
    ) -> RelationResult<()> {
        self.ensure_data_complete(collection_id)?;
        let command =
            CollectionEndPointReplaceCommand::new(self, collection_id.clone(), index, replacement)?;
        if command.is_redundant() {
            let opposite = self.mapping.opposite_definition(
                collection_id.object_id().class_name(),
                collection_id.property_name(),
            )?;
            let real_id = RelationEndPointId::new(
                command.replacement().clone(),
                opposite.property_name,
            );
            self.manager.end_point_mut(collection_id)?.touch();
            self.manager.end_point_mut(&real_id)?.touch();
            return Ok(());
        }
        self.run(&command)
    }

    /// Replace the whole contents of a collection end-point with a
    /// standalone collection.
    ///
    /// The end-point adopts the new collection's storage; any handle
    /// obtained earlier keeps the old contents and becomes standalone.
    pub fn set_related_objects(
        &mut self,
        collection_id: &RelationEndPointId,
        new_collection: DomainObjectCollection,
    ) -> RelationResult<()> {
        self.ensure_data_complete(collection_id)?;
        let command = CollectionEndPointSetCollectionCommand::new(
            self,
            collection_id.clone(),
            new_collection,
        )?;
        self.run(&command)
    }

    /// Reorder a collection end-point in place.
    ///
    /// A sort that changes the order raises one wholesale data-replaced
    /// notification; a sort that leaves the order intact only touches the
    /// end-point and raises a state-updated notification.
    pub fn sort_related_objects<F>(
        &mut self,
        collection_id: &RelationEndPointId,
        compare: F,
    ) -> RelationResult<bool>
    where
        F: FnMut(&ObjectId, &ObjectId) -> std::cmp::Ordering,
    {
        self.ensure_data_complete(collection_id)?;
        let collection = self.manager.collection_mut(collection_id)?;
        let changed = collection.sort_by(compare)?;
        collection.touch();
        if changed {
            self.notify_collection_data_replaced(collection_id);
        } else {
            self.notify_virtual_end_point_state_updated(collection_id, true);
        }
        Ok(changed)
    }

    // ---- deletion -------------------------------------------------------

    /// Delete an object: every opposite end it participates in detaches it
    /// with full notifications, while its own end-points empty silently.
    pub fn delete_object(&mut self, object: &ObjectId) -> RelationResult<()> {
        enum OwnedEnd {
            Real(Option<ObjectId>),
            VirtualObject(Option<ObjectId>),
            Collection(Vec<ObjectId>),
        }

        let mut owned: Vec<(RelationEndPointId, OwnedEnd)> = Vec::new();
        for definition in self
            .mapping
            .end_point_definitions_for_class(object.class_name())
        {
            let id = RelationEndPointId::new(object.clone(), definition.property_name.clone());
            match self.manager.get_relation_end_point_without_loading(&id) {
                Some(RelationEndPoint::Real(ep)) => {
                    owned.push((id, OwnedEnd::Real(ep.opposite_object().cloned())));
                }
                Some(RelationEndPoint::VirtualObject(ep)) if ep.is_data_complete() => {
                    owned.push((id, OwnedEnd::VirtualObject(ep.opposite_object()?)));
                }
                Some(RelationEndPoint::Collection(ep)) if ep.is_data_complete() => {
                    owned.push((id, OwnedEnd::Collection(ep.items()?)));
                }
                _ => {}
            }
        }

        let mut expanded = ExpandedCommand::default();
        for (id, end) in owned {
            let opposite = self
                .mapping
                .opposite_definition(id.object_id().class_name(), id.property_name())?;
            match end {
                OwnedEnd::Real(old) => {
                    if let Some(old_owner) = &old {
                        if !opposite.is_anonymous {
                            let opposite_end = RelationEndPointId::new(
                                old_owner.clone(),
                                opposite.property_name.clone(),
                            );
                            if crate::commands::has_complete_data(self, &opposite_end) {
                                if opposite.cardinality.is_collection() {
                                    if self.manager.collection(&opposite_end)?.contains(object) {
                                        expanded.push(Box::new(
                                            CollectionEndPointRemoveCommand::new(
                                                self,
                                                opposite_end,
                                                object.clone(),
                                            )?,
                                        ));
                                    }
                                } else {
                                    expanded.push(Box::new(ObjectEndPointSetCommand::new(
                                        self,
                                        opposite_end,
                                        None,
                                    )?));
                                }
                            }
                        }
                    }
                    expanded.push(Box::new(RealObjectEndPointRegistrationDecorator::new(
                        Box::new(ObjectEndPointDeleteCommand::new(self, id.clone())),
                        id,
                        old,
                        None,
                    )));
                }
                OwnedEnd::VirtualObject(old) => {
                    if let Some(old_owner) = old {
                        let opposite_end = RelationEndPointId::new(
                            old_owner,
                            opposite.property_name.clone(),
                        );
                        if self
                            .manager
                            .get_relation_end_point_without_loading(&opposite_end)
                            .is_some()
                        {
                            expanded.push(ObjectEndPointSetCommand::with_registration(
                                self,
                                opposite_end,
                                None,
                            )?);
                        }
                    }
                    expanded.push(Box::new(ObjectEndPointDeleteCommand::new(self, id)));
                }
                OwnedEnd::Collection(items) => {
                    for item in items {
                        let item_end = RelationEndPointId::new(
                            item,
                            opposite.property_name.clone(),
                        );
                        if self
                            .manager
                            .get_relation_end_point_without_loading(&item_end)
                            .is_some()
                        {
                            expanded.push(ObjectEndPointSetCommand::with_registration(
                                self,
                                item_end,
                                None,
                            )?);
                        }
                    }
                    expanded.push(Box::new(CollectionEndPointDeleteCommand::new(self, id)));
                }
            }
        }
        debug!(transaction = %self.id, object = %object, commands = expanded.len(),
            "deleting object");
        expanded.notify_and_perform(self)
    }

    // ---- synchronization ------------------------------------------------

    /// Reconcile a virtual end-point with the real end-points registered
    /// against it; returns the adopted objects
    pub fn synchronize(&mut self, id: &RelationEndPointId) -> RelationResult<Vec<ObjectId>> {
        let adopted = self.manager.synchronize(id)?;
        if !adopted.is_empty() {
            self.notify_virtual_end_point_state_updated(id, true);
        }
        Ok(adopted)
    }

    // ---- sub-transactions -----------------------------------------------

    /// Fork a sub-transaction seeing this transaction's current values as
    /// its baseline. The parent stays untouched until the sub-transaction
    /// is committed back.
    pub fn create_sub_transaction(&self) -> ClientTransaction {
        let id = Uuid::new_v4();
        debug!(transaction = %id, parent = %self.id, "creating sub-transaction");
        ClientTransaction {
            id,
            parent_id: Some(self.id),
            mapping: Arc::clone(&self.mapping),
            manager: self.manager.fork(),
            event_sinks: Vec::new(),
        }
    }

    /// Fold a sub-transaction's net changes back into this transaction.
    ///
    /// End-points the sub-transaction neither changed nor touched are left
    /// alone; discarding a sub-transaction is simply dropping it.
    pub fn commit_sub_transaction(&mut self, sub: ClientTransaction) -> RelationResult<()> {
        if sub.parent_id != Some(self.id) {
            return Err(RelationError::Transaction(format!(
                "Transaction '{}' is not a sub-transaction of '{}'",
                sub.id, self.id
            )));
        }
        let mut applied = 0usize;
        for end_point in sub.manager.end_points() {
            if !(end_point.has_changed() || end_point.has_been_touched()) {
                continue;
            }
            applied += 1;
            let id = end_point.id().clone();
            let exists = self
                .manager
                .get_relation_end_point_without_loading(&id)
                .is_some();
            let parent_complete = self
                .manager
                .get_relation_end_point_without_loading(&id)
                .map(|ep| ep.is_data_complete())
                .unwrap_or(false);
            match end_point {
                RelationEndPoint::Real(ep) if exists => {
                    let parent = self.manager.real_mut(&id)?;
                    parent.set_opposite_object(ep.opposite_object().cloned());
                    parent.set_synchronized(ep.is_synchronized());
                    parent.touch();
                }
                RelationEndPoint::VirtualObject(ep) if parent_complete => {
                    let parent = self.manager.virtual_object_mut(&id)?;
                    parent.set_opposite_object(ep.opposite_object()?);
                    parent.touch();
                }
                RelationEndPoint::Collection(ep) if parent_complete => {
                    let items = ep.items()?;
                    let parent = self.manager.collection_mut(&id)?;
                    parent.replace_contents(items)?;
                    parent.touch();
                }
                other => {
                    self.manager.insert_end_point(other.clone_detached());
                }
            }
        }
        debug!(transaction = %self.id, sub = %sub.id, end_points = applied,
            "committed sub-transaction");
        Ok(())
    }

    // ---- commit and rollback --------------------------------------------

    /// Accept every changed or touched end-point's current data as the new
    /// baseline
    pub fn commit(&mut self) {
        let mut committed = 0usize;
        for end_point in self.manager.end_points_mut() {
            if end_point.has_changed() || end_point.has_been_touched() {
                end_point.commit();
                committed += 1;
            }
        }
        debug!(transaction = %self.id, end_points = committed, "committed relation changes");
    }

    /// Restore every changed or touched end-point to its baseline data
    pub fn rollback(&mut self) {
        let mut rolled_back = 0usize;
        for end_point in self.manager.end_points_mut() {
            if end_point.has_changed() || end_point.has_been_touched() {
                end_point.rollback();
                rolled_back += 1;
            }
        }
        debug!(transaction = %self.id, end_points = rolled_back, "rolled back relation changes");
    }

    fn run(&mut self, command: &dyn DataCommand) -> RelationResult<()> {
        let expanded = command.expand(self)?;
        expanded.notify_and_perform(self)
    }
}
