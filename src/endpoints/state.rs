//! Lazy-Load Completion State

/// Data completeness of a lazily loadable end-point.
///
/// `Loading` exists only for the duration of one blocking load call; a second
/// load request observing it indicates a cyclic lazy-load trigger and fails
/// fast instead of deadlocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// No data has been loaded yet
    NotLoaded,
    /// A load is in progress; re-entrant loading is rejected
    Loading,
    /// Data is complete and will not be loaded again
    Complete,
}

impl CompletionState {
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_complete_is_complete() {
        assert!(CompletionState::Complete.is_complete());
        assert!(!CompletionState::NotLoaded.is_complete());
        assert!(!CompletionState::Loading.is_complete());
    }
}
