//! Relation End-Point Manager - transaction-scoped end-point registry
//!
//! A pure index from `RelationEndPointId` to live end-point instances,
//! created on demand. End-point identity is stable for the lifetime of the
//! owning transaction: two lookups with the same ID return the same
//! instance, and the registry never holds more than one end-point per ID.
//! Loading goes through the end-point's own state machine and the storage
//! collaborator; the manager itself never queries storage directly.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::endpoints::{
    CollectionEndPoint, RealObjectEndPoint, RelationEndPoint, VirtualObjectEndPoint,
};
use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::loader::RelationLoader;
use crate::mapping::{Cardinality, MappingRegistry};

/// Transaction-scoped registry owning all materialized end-points.
#[derive(Debug)]
pub struct RelationEndPointManager {
    end_points: HashMap<RelationEndPointId, RelationEndPoint>,
    mapping: Arc<MappingRegistry>,
    loader: Arc<dyn RelationLoader>,
}

impl RelationEndPointManager {
    pub fn new(mapping: Arc<MappingRegistry>, loader: Arc<dyn RelationLoader>) -> Self {
        Self {
            end_points: HashMap::new(),
            mapping,
            loader,
        }
    }

    pub fn mapping(&self) -> &Arc<MappingRegistry> {
        &self.mapping
    }

    /// Look up an existing end-point; never constructs or loads.
    ///
    /// Used by consistency checks that must not trigger side effects.
    pub fn get_relation_end_point_without_loading(
        &self,
        id: &RelationEndPointId,
    ) -> Option<&RelationEndPoint> {
        self.end_points.get(id)
    }

    /// Return the existing virtual end-point or construct a new incomplete
    /// one; never triggers loading
    pub fn get_or_create_virtual_end_point(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<&mut RelationEndPoint> {
        if !self.end_points.contains_key(id) {
            let definition = self
                .mapping
                .end_point_definition(id.object_id().class_name(), id.property_name())?;
            if !definition.is_virtual {
                return Err(RelationError::Usage(format!(
                    "End-point '{}' is not virtual; real end-points are registered when their \
                     owning object's row is loaded",
                    id
                )));
            }
            let end_point = match definition.cardinality {
                Cardinality::Many => RelationEndPoint::Collection(CollectionEndPoint::new(
                    id.clone(),
                    definition,
                )),
                Cardinality::One => RelationEndPoint::VirtualObject(VirtualObjectEndPoint::new(
                    id.clone(),
                    definition,
                )),
            };
            debug!(end_point = %id, "materializing virtual end-point");
            self.end_points.insert(id.clone(), end_point);
        }
        Ok(self
            .end_points
            .get_mut(id)
            .expect("end-point was just inserted"))
    }

    /// Register the real end-point of a freshly loaded object row.
    ///
    /// The foreign key travels with the row, so the end-point is complete
    /// immediately. The opposite virtual end is told about the new member so
    /// its in-memory index stays correct without forcing a load.
    pub fn register_real_object_end_point(
        &mut self,
        id: RelationEndPointId,
        foreign_key: Option<ObjectId>,
    ) -> RelationResult<()> {
        let definition = self
            .mapping
            .end_point_definition(id.object_id().class_name(), id.property_name())?;
        if definition.is_virtual {
            return Err(RelationError::Usage(format!(
                "End-point '{}' is virtual and cannot hold a foreign key",
                id
            )));
        }
        if self.end_points.contains_key(&id) {
            return Err(RelationError::Usage(format!(
                "End-point '{}' is already registered",
                id
            )));
        }

        let owner = id.object_id().clone();
        debug!(end_point = %id, foreign_key = ?foreign_key.as_ref().map(|fk| fk.to_string()),
            "registering real object end-point");
        self.end_points.insert(
            id.clone(),
            RelationEndPoint::Real(RealObjectEndPoint::new(
                id.clone(),
                definition,
                foreign_key.clone(),
            )),
        );

        if let Some(opposite_owner) = foreign_key {
            let vouched = self.register_opposite(&id, &opposite_owner, &owner)?;
            if !vouched {
                self.real_mut(&id)?.set_synchronized(false);
            }
        }
        Ok(())
    }

    /// Synchronously load an incomplete end-point's data.
    ///
    /// Returns true when a load was actually performed; a second call is a
    /// no-op. A call arriving while the same end-point is mid-load fails
    /// fast. A mandatory relation resolving empty is a persistence error and
    /// leaves the end-point non-complete so a retry can re-attempt the load.
    ///
    /// Loaded data is a snapshot of the persisted rows and may predate
    /// foreign-key writes already performed in this transaction; it is
    /// reconciled against the registered real end-points before the end
    /// becomes complete, so reads never resurrect a membership the
    /// transaction has moved away.
    pub fn ensure_data_complete(&mut self, id: &RelationEndPointId) -> RelationResult<bool> {
        let loader = Arc::clone(&self.loader);

        // First phase only transitions the state machine; the load result is
        // reconciled and installed afterwards because reconciliation reads
        // other end-points in this registry.
        let (is_collection, is_mandatory) = {
            let end_point = self.get_or_create_if_virtual(id)?;
            match end_point {
                RelationEndPoint::Real(_) => return Ok(false),
                RelationEndPoint::VirtualObject(ep) => {
                    if !ep.try_begin_load()? {
                        return Ok(false);
                    }
                    (false, ep.definition().is_mandatory)
                }
                RelationEndPoint::Collection(ep) => {
                    if !ep.try_begin_load()? {
                        return Ok(false);
                    }
                    (true, ep.definition().is_mandatory)
                }
            }
        };

        let unvouched: Vec<ObjectId> = if is_collection {
            debug!(end_point = %id, "loading collection end-point data");
            let items = match loader.load_related_objects(id) {
                Ok(items) => items,
                Err(e) => {
                    self.collection_mut(id)?.abort_load();
                    return Err(e);
                }
            };
            if items.is_empty() && is_mandatory {
                self.collection_mut(id)?.abort_load();
                return Err(RelationError::MandatoryRelationNotSet {
                    object_id: id.object_id().clone(),
                    property_name: id.property_name().to_string(),
                });
            }
            let items = self.reconcile_loaded_members(id, items)?;
            self.collection_mut(id)?.complete_load(items)
        } else {
            debug!(end_point = %id, "loading virtual object end-point data");
            let data = match loader.load_related_object(id) {
                Ok(data) => data,
                Err(e) => {
                    self.virtual_object_mut(id)?.abort_load();
                    return Err(e);
                }
            };
            if data.is_none() && is_mandatory {
                self.virtual_object_mut(id)?.abort_load();
                return Err(RelationError::MandatoryRelationNotSet {
                    object_id: id.object_id().clone(),
                    property_name: id.property_name().to_string(),
                });
            }
            let data = self.reconcile_loaded_partner(id, data)?;
            self.virtual_object_mut(id)?.complete_load(data)
        };

        for owner in &unvouched {
            self.flag_unsynchronized(id, owner)?;
        }
        Ok(true)
    }

    /// Reconcile a loaded collection snapshot with this transaction.
    ///
    /// A member whose registered real end-point no longer points at this
    /// owner is dropped; a pending opposite whose foreign key was moved here
    /// by an in-transaction write is appended. Pending opposites whose
    /// foreign keys are unchanged are left to the unsynchronized flow, since
    /// a disagreement there comes from the persisted rows themselves.
    fn reconcile_loaded_members(
        &self,
        id: &RelationEndPointId,
        items: Vec<ObjectId>,
    ) -> RelationResult<Vec<ObjectId>> {
        let real_property = self.opposite_real_property(id)?;
        let owner = id.object_id();

        let mut confirmed: Vec<ObjectId> = Vec::with_capacity(items.len());
        for member in items {
            match self.registered_real(&member, &real_property) {
                Some(real) if real.opposite_object() != Some(owner) => {
                    debug!(end_point = %id, member = %member,
                        "dropping loaded member whose foreign key moved in this transaction");
                }
                _ => confirmed.push(member),
            }
        }

        if let Some(RelationEndPoint::Collection(ep)) =
            self.get_relation_end_point_without_loading(id)
        {
            for pending in ep.pending_opposites() {
                if confirmed.contains(pending) {
                    continue;
                }
                if let Some(real) = self.registered_real(pending, &real_property) {
                    if real.has_changed() && real.opposite_object() == Some(owner) {
                        confirmed.push(pending.clone());
                    }
                }
            }
        }
        Ok(confirmed)
    }

    /// Reconcile a loaded 1:1 partner with this transaction, mirroring
    /// [`Self::reconcile_loaded_members`] for the single-object case.
    fn reconcile_loaded_partner(
        &self,
        id: &RelationEndPointId,
        data: Option<ObjectId>,
    ) -> RelationResult<Option<ObjectId>> {
        let real_property = self.opposite_real_property(id)?;
        let owner = id.object_id();

        if let Some(member) = &data {
            if let Some(real) = self.registered_real(member, &real_property) {
                if real.opposite_object() != Some(owner) {
                    debug!(end_point = %id, member = %member,
                        "dropping loaded partner whose foreign key moved in this transaction");
                    return Ok(self.written_pending_partner(id, &real_property));
                }
            }
            return Ok(data);
        }
        Ok(self.written_pending_partner(id, &real_property))
    }

    fn written_pending_partner(
        &self,
        id: &RelationEndPointId,
        real_property: &str,
    ) -> Option<ObjectId> {
        let owner = id.object_id();
        if let Some(RelationEndPoint::VirtualObject(ep)) =
            self.get_relation_end_point_without_loading(id)
        {
            for pending in ep.pending_opposites() {
                if let Some(real) = self.registered_real(pending, real_property) {
                    if real.has_changed() && real.opposite_object() == Some(owner) {
                        return Some(pending.clone());
                    }
                }
            }
        }
        None
    }

    fn opposite_real_property(&self, id: &RelationEndPointId) -> RelationResult<String> {
        Ok(self
            .mapping
            .opposite_definition(id.object_id().class_name(), id.property_name())?
            .property_name)
    }

    fn registered_real(&self, owner: &ObjectId, property: &str) -> Option<&RealObjectEndPoint> {
        let real_id = RelationEndPointId::new(owner.clone(), property.to_string());
        match self.end_points.get(&real_id) {
            Some(RelationEndPoint::Real(ep)) => Some(ep),
            _ => None,
        }
    }

    /// Force-complete a virtual object end-point with externally supplied
    /// data; false (and no change) when already complete
    pub fn mark_object_data_complete(
        &mut self,
        id: &RelationEndPointId,
        data: Option<ObjectId>,
    ) -> RelationResult<bool> {
        let end_point = self.get_or_create_virtual_end_point(id)?;
        Ok(end_point.as_virtual_object_mut()?.mark_data_complete(data))
    }

    /// Force-complete a collection end-point with externally supplied data;
    /// false (and no change) when already complete
    pub fn mark_collection_data_complete(
        &mut self,
        id: &RelationEndPointId,
        items: Vec<ObjectId>,
    ) -> RelationResult<bool> {
        let end_point = self.get_or_create_virtual_end_point(id)?;
        Ok(end_point.as_collection_mut()?.mark_data_complete(items))
    }

    /// Fold a virtual end's unsynchronized opposites back into its data,
    /// flipping the affected real end-points' synchronization flags.
    ///
    /// Returns the adopted opposite owners.
    pub fn synchronize(&mut self, id: &RelationEndPointId) -> RelationResult<Vec<ObjectId>> {
        let real_property = self
            .mapping
            .opposite_definition(id.object_id().class_name(), id.property_name())?
            .property_name;

        let adopted = match self.end_point_mut(id)? {
            RelationEndPoint::VirtualObject(ep) => ep.synchronize()?.into_iter().collect(),
            RelationEndPoint::Collection(ep) => ep.synchronize()?,
            RelationEndPoint::Real(_) => {
                return Err(RelationError::Usage(format!(
                    "End-point '{}' is real; synchronization applies to virtual ends",
                    id
                )))
            }
        };

        for owner in &adopted {
            let real_id = RelationEndPointId::new(owner.clone(), real_property.clone());
            if let Some(ep) = self.end_points.get_mut(&real_id) {
                ep.as_real_mut()?.set_synchronized(true);
            }
        }
        Ok(adopted)
    }

    /// Register a real end-point's owner with the opposite virtual end's
    /// in-memory index. Returns whether the opposite end vouches for it.
    pub(crate) fn register_opposite(
        &mut self,
        real_id: &RelationEndPointId,
        opposite_owner: &ObjectId,
        member: &ObjectId,
    ) -> RelationResult<bool> {
        let opposite = self
            .mapping
            .opposite_definition(real_id.object_id().class_name(), real_id.property_name())?;
        if opposite.is_anonymous {
            return Ok(true);
        }
        let opposite_id =
            RelationEndPointId::new(opposite_owner.clone(), opposite.property_name.clone());
        let end_point = self.get_or_create_virtual_end_point(&opposite_id)?;
        match end_point {
            RelationEndPoint::VirtualObject(ep) => Ok(ep.register_opposite(member.clone())),
            RelationEndPoint::Collection(ep) => Ok(ep.register_opposite(member.clone())),
            RelationEndPoint::Real(_) => unreachable!("virtual lookup returned a real end-point"),
        }
    }

    /// Record a real end-point's owner in the opposite virtual end's pending
    /// index only while that end is not yet loaded.
    ///
    /// Command expansions mutate complete opposite ends through explicit
    /// collection or set commands, so a registration against a complete end
    /// is a no-op here rather than an unsynchronized entry.
    pub(crate) fn register_opposite_pending(
        &mut self,
        real_id: &RelationEndPointId,
        opposite_owner: &ObjectId,
        member: &ObjectId,
    ) -> RelationResult<()> {
        let opposite = self
            .mapping
            .opposite_definition(real_id.object_id().class_name(), real_id.property_name())?;
        if opposite.is_anonymous {
            return Ok(());
        }
        let opposite_id =
            RelationEndPointId::new(opposite_owner.clone(), opposite.property_name.clone());
        let end_point = self.get_or_create_virtual_end_point(&opposite_id)?;
        match end_point {
            RelationEndPoint::VirtualObject(ep) => {
                if !ep.is_data_complete() {
                    ep.register_opposite(member.clone());
                }
            }
            RelationEndPoint::Collection(ep) => {
                if !ep.is_data_complete() {
                    ep.register_opposite(member.clone());
                }
            }
            RelationEndPoint::Real(_) => unreachable!("virtual lookup returned a real end-point"),
        }
        Ok(())
    }

    /// Remove a real end-point's owner from the opposite virtual end's
    /// in-memory index
    pub(crate) fn unregister_opposite(
        &mut self,
        real_id: &RelationEndPointId,
        opposite_owner: &ObjectId,
        member: &ObjectId,
    ) -> RelationResult<()> {
        let opposite = self
            .mapping
            .opposite_definition(real_id.object_id().class_name(), real_id.property_name())?;
        if opposite.is_anonymous {
            return Ok(());
        }
        let opposite_id =
            RelationEndPointId::new(opposite_owner.clone(), opposite.property_name.clone());
        if let Some(end_point) = self.end_points.get_mut(&opposite_id) {
            match end_point {
                RelationEndPoint::VirtualObject(ep) => ep.unregister_opposite(member),
                RelationEndPoint::Collection(ep) => ep.unregister_opposite(member),
                RelationEndPoint::Real(_) => {}
            }
        }
        Ok(())
    }

    pub fn end_point(&self, id: &RelationEndPointId) -> RelationResult<&RelationEndPoint> {
        self.end_points.get(id).ok_or_else(|| {
            RelationError::Usage(format!(
                "End-point '{}' is not registered in this transaction",
                id
            ))
        })
    }

    pub(crate) fn end_point_mut(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<&mut RelationEndPoint> {
        self.end_points.get_mut(id).ok_or_else(|| {
            RelationError::Usage(format!(
                "End-point '{}' is not registered in this transaction",
                id
            ))
        })
    }

    pub(crate) fn real(&self, id: &RelationEndPointId) -> RelationResult<&RealObjectEndPoint> {
        self.end_point(id)?.as_real()
    }

    pub(crate) fn real_mut(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<&mut RealObjectEndPoint> {
        self.end_point_mut(id)?.as_real_mut()
    }

    pub(crate) fn collection(&self, id: &RelationEndPointId) -> RelationResult<&CollectionEndPoint> {
        self.end_point(id)?.as_collection()
    }

    pub(crate) fn collection_mut(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<&mut CollectionEndPoint> {
        self.end_point_mut(id)?.as_collection_mut()
    }

    pub(crate) fn virtual_object_mut(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<&mut VirtualObjectEndPoint> {
        self.end_point_mut(id)?.as_virtual_object_mut()
    }

    /// Iterate all materialized end-points
    pub fn end_points(&self) -> impl Iterator<Item = &RelationEndPoint> {
        self.end_points.values()
    }

    pub(crate) fn end_points_mut(&mut self) -> impl Iterator<Item = &mut RelationEndPoint> {
        self.end_points.values_mut()
    }

    /// Detached deep copy of every end-point, for a sub-transaction registry
    pub(crate) fn detached_end_points(&self) -> HashMap<RelationEndPointId, RelationEndPoint> {
        self.end_points
            .iter()
            .map(|(id, ep)| (id.clone(), ep.clone_detached()))
            .collect()
    }

    /// A new manager over the same mapping and loader, seeded with detached
    /// copies of every end-point. The fork sees the parent's current values
    /// as its baseline.
    pub(crate) fn fork(&self) -> RelationEndPointManager {
        let mut manager =
            RelationEndPointManager::new(Arc::clone(&self.mapping), Arc::clone(&self.loader));
        manager.adopt_end_points(self.detached_end_points());
        for end_point in manager.end_points_mut() {
            end_point.commit();
        }
        manager
    }

    pub(crate) fn adopt_end_points(
        &mut self,
        end_points: HashMap<RelationEndPointId, RelationEndPoint>,
    ) {
        self.end_points = end_points;
    }

    pub(crate) fn insert_end_point(&mut self, end_point: RelationEndPoint) {
        self.end_points.insert(end_point.id().clone(), end_point);
    }

    fn get_or_create_if_virtual(
        &mut self,
        id: &RelationEndPointId,
    ) -> RelationResult<&mut RelationEndPoint> {
        let definition = self
            .mapping
            .end_point_definition(id.object_id().class_name(), id.property_name())?;
        if definition.is_virtual {
            self.get_or_create_virtual_end_point(id)
        } else {
            self.end_point_mut(id)
        }
    }

    fn flag_unsynchronized(
        &mut self,
        virtual_id: &RelationEndPointId,
        owner: &ObjectId,
    ) -> RelationResult<()> {
        let real_property = self
            .mapping
            .opposite_definition(virtual_id.object_id().class_name(), virtual_id.property_name())?
            .property_name;
        let real_id = RelationEndPointId::new(owner.clone(), real_property);
        if let Some(ep) = self.end_points.get_mut(&real_id) {
            ep.as_real_mut()?.set_synchronized(false);
        }
        Ok(())
    }
}
