//! Virtual Object End-Point - the 1:1 relation side without a foreign key

use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::mapping::RelationEndPointDefinition;

use super::state::CompletionState;

/// Lazily loaded 1:1 end-point whose value is derived from the opposite real
/// end-point.
#[derive(Debug, Clone)]
pub struct VirtualObjectEndPoint {
    id: RelationEndPointId,
    definition: RelationEndPointDefinition,
    state: CompletionState,
    current: Option<ObjectId>,
    original: Option<ObjectId>,
    touched: bool,
    /// Opposite real end-point owners registered before this end loaded;
    /// more than one entry means competing claims on the 1:1 slot
    pending_opposites: Vec<ObjectId>,
    /// Opposites registered after completion but not vouched for by the data
    unsynchronized_opposites: Vec<ObjectId>,
}

impl VirtualObjectEndPoint {
    pub fn new(id: RelationEndPointId, definition: RelationEndPointDefinition) -> Self {
        Self {
            id,
            definition,
            state: CompletionState::NotLoaded,
            current: None,
            original: None,
            touched: false,
            pending_opposites: Vec::new(),
            unsynchronized_opposites: Vec::new(),
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &RelationEndPointDefinition {
        &self.definition
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn is_data_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Transition into `Loading`; `Ok(false)` when already complete
    pub(crate) fn try_begin_load(&mut self) -> RelationResult<bool> {
        match self.state {
            CompletionState::Complete => Ok(false),
            CompletionState::Loading => Err(RelationError::LoadInProgress(self.id.clone())),
            CompletionState::NotLoaded => {
                self.state = CompletionState::Loading;
                Ok(true)
            }
        }
    }

    /// Install loaded data, transitioning to `Complete`.
    ///
    /// Returns the opposite owners left unvouched by the loaded data, so the
    /// manager can flag the corresponding real end-points.
    pub(crate) fn complete_load(&mut self, data: Option<ObjectId>) -> Vec<ObjectId> {
        self.current = data.clone();
        self.original = data;
        self.state = CompletionState::Complete;

        let pending = std::mem::take(&mut self.pending_opposites);
        let mut unvouched = Vec::new();
        for owner in pending {
            if Some(&owner) != self.current.as_ref() {
                self.unsynchronized_opposites.push(owner.clone());
                unvouched.push(owner);
            }
        }
        unvouched
    }

    /// Abort an in-flight load, returning to `NotLoaded` so a retry can
    /// re-attempt after the data is fixed
    pub(crate) fn abort_load(&mut self) {
        if self.state == CompletionState::Loading {
            self.state = CompletionState::NotLoaded;
        }
    }

    /// Force-complete with externally supplied data, bypassing the query
    /// path; no-op returning false when already complete
    pub(crate) fn mark_data_complete(&mut self, data: Option<ObjectId>) -> bool {
        if self.state.is_complete() {
            return false;
        }
        self.complete_load(data);
        true
    }

    /// The current value; usage error when the data is not complete
    pub fn opposite_object(&self) -> RelationResult<Option<ObjectId>> {
        if !self.state.is_complete() {
            return Err(RelationError::Usage(format!(
                "The data of end-point '{}' is incomplete; call ensure_data_complete first",
                self.id
            )));
        }
        Ok(self.current.clone())
    }

    pub(crate) fn set_opposite_object(&mut self, value: Option<ObjectId>) {
        self.current = value;
    }

    pub fn has_changed(&self) -> bool {
        self.state.is_complete() && self.current != self.original
    }

    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Record an opposite real end-point while this end is incomplete
    pub(crate) fn register_opposite(&mut self, owner: ObjectId) -> bool {
        match self.state {
            CompletionState::Complete => {
                if Some(&owner) != self.current.as_ref() {
                    if !self.unsynchronized_opposites.contains(&owner) {
                        self.unsynchronized_opposites.push(owner);
                    }
                    false
                } else {
                    true
                }
            }
            _ => {
                if !self.pending_opposites.contains(&owner) {
                    self.pending_opposites.push(owner);
                }
                true
            }
        }
    }

    pub(crate) fn unregister_opposite(&mut self, owner: &ObjectId) {
        self.pending_opposites.retain(|o| o != owner);
        self.unsynchronized_opposites.retain(|o| o != owner);
    }

    /// Opposite owners registered before this end loaded
    pub(crate) fn pending_opposites(&self) -> &[ObjectId] {
        &self.pending_opposites
    }

    /// Opposites currently known but not vouched for by the loaded data
    pub fn unsynchronized_opposites(&self) -> &[ObjectId] {
        &self.unsynchronized_opposites
    }

    /// Adopt the unvouched opposite as the current and original value.
    ///
    /// This reconciles state without registering as a value-level change.
    /// Two distinct unvouched claimants cannot share a 1:1 slot; that is a
    /// consistency error rather than a silent last-writer-wins.
    pub(crate) fn synchronize(&mut self) -> RelationResult<Option<ObjectId>> {
        if self.unsynchronized_opposites.len() > 1 {
            return Err(RelationError::Consistency(format!(
                "{} objects claim the single-object end-point '{}'",
                self.unsynchronized_opposites.len(),
                self.id
            )));
        }
        let adopted = match self.unsynchronized_opposites.pop() {
            Some(adopted) => adopted,
            None => return Ok(None),
        };
        self.current = Some(adopted.clone());
        self.original = Some(adopted.clone());
        Ok(Some(adopted))
    }

    pub(crate) fn commit(&mut self) {
        if self.state.is_complete() {
            self.original = self.current.clone();
        }
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        if self.state.is_complete() {
            self.current = self.original.clone();
        }
        self.touched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end_point() -> VirtualObjectEndPoint {
        let order = ObjectId::new("Order");
        VirtualObjectEndPoint::new(
            RelationEndPointId::new(order, "OrderTicket"),
            RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
        )
    }

    #[test]
    fn test_starts_incomplete_and_rejects_access() {
        let ep = end_point();
        assert!(!ep.is_data_complete());
        assert!(ep.opposite_object().is_err());
    }

    #[test]
    fn test_load_state_machine() {
        let mut ep = end_point();
        assert!(ep.try_begin_load().unwrap());

        // Re-entrant load while loading fails fast.
        let err = ep.try_begin_load().unwrap_err();
        assert!(matches!(err, RelationError::LoadInProgress(_)));

        let ticket = ObjectId::new("OrderTicket");
        ep.complete_load(Some(ticket.clone()));
        assert!(ep.is_data_complete());
        assert_eq!(ep.opposite_object().unwrap(), Some(ticket));

        // A second load request is a completed no-op.
        assert!(!ep.try_begin_load().unwrap());
    }

    #[test]
    fn test_abort_load_allows_retry() {
        let mut ep = end_point();
        assert!(ep.try_begin_load().unwrap());
        ep.abort_load();
        assert!(!ep.is_data_complete());
        assert!(ep.try_begin_load().unwrap());
    }

    #[test]
    fn test_mark_data_complete_at_most_once() {
        let mut ep = end_point();
        let ticket = ObjectId::new("OrderTicket");
        assert!(ep.mark_data_complete(Some(ticket.clone())));
        assert!(!ep.mark_data_complete(None));
        assert_eq!(ep.opposite_object().unwrap(), Some(ticket));
    }

    #[test]
    fn test_pending_opposite_vouched_by_load() {
        let mut ep = end_point();
        let ticket = ObjectId::new("OrderTicket");
        ep.register_opposite(ticket.clone());

        ep.try_begin_load().unwrap();
        assert!(ep.complete_load(Some(ticket.clone())).is_empty());
        assert_eq!(ep.opposite_object().unwrap(), Some(ticket));
    }

    #[test]
    fn test_pending_opposite_left_unvouched() {
        let mut ep = end_point();
        let ticket = ObjectId::new("OrderTicket");
        ep.register_opposite(ticket.clone());

        ep.try_begin_load().unwrap();
        assert_eq!(ep.complete_load(None), vec![ticket.clone()]);

        // Synchronizing adopts the unvouched opposite without registering a change.
        assert_eq!(ep.synchronize().unwrap(), Some(ticket.clone()));
        assert_eq!(ep.opposite_object().unwrap(), Some(ticket));
        assert!(!ep.has_changed());
    }

    #[test]
    fn test_register_after_completion_is_unsynchronized() {
        let mut ep = end_point();
        ep.mark_data_complete(None);

        let ticket = ObjectId::new("OrderTicket");
        assert!(!ep.register_opposite(ticket.clone()));
        ep.unregister_opposite(&ticket);
        assert_eq!(ep.synchronize().unwrap(), None);
    }

    #[test]
    fn test_competing_pending_claims_are_both_kept() {
        let mut ep = end_point();
        let first = ObjectId::new("OrderTicket");
        let second = ObjectId::new("OrderTicket");
        ep.register_opposite(first.clone());
        ep.register_opposite(second.clone());
        assert_eq!(ep.pending_opposites(), &[first.clone(), second.clone()]);

        ep.try_begin_load().unwrap();
        assert_eq!(ep.complete_load(None), vec![first.clone(), second.clone()]);
        assert_eq!(ep.unsynchronized_opposites(), &[first, second]);

        // Both objects claim the slot; adoption cannot pick a winner.
        let err = ep.synchronize().unwrap_err();
        assert!(matches!(err, RelationError::Consistency(_)));
    }
}
