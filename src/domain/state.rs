use super::phone::{Phone, PhoneId};
use crate::store::RemoteError;

/// The cache's observable view of the collection.
///
/// Ids within any list held here are unique.
#[derive(Debug, Clone)]
pub enum CollectionState {
    /// A fetch is in flight and there is no list to show.
    Loading,
    /// The last known list, including optimistic edits.
    Success(Vec<Phone>),
    /// The last store call failed.
    ///
    /// `retained` is the list after rollback (empty when a fetch failed), so a
    /// consumer can keep rendering it next to the error.
    Failure {
        error: RemoteError,
        retained: Vec<Phone>,
    },
}

impl CollectionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The list this state carries, if any.
    pub fn phones(&self) -> Option<&[Phone]> {
        match self {
            Self::Loading => None,
            Self::Success(phones) => Some(phones),
            Self::Failure { retained, .. } => Some(retained),
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match self {
            Self::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn get(&self, id: &PhoneId) -> Option<&Phone> {
        self.phones()?.iter().find(|p| &p.id == id)
    }

    pub(crate) fn phones_mut(&mut self) -> Option<&mut Vec<Phone>> {
        match self {
            Self::Loading => None,
            Self::Success(phones) => Some(phones),
            Self::Failure { retained, .. } => Some(retained),
        }
    }

    /// Moves the current list into `Success`, turning a `Failure` back into a
    /// normal view. `Loading` is left alone.
    pub(crate) fn resume(&mut self) {
        if let Self::Failure { retained, .. } = self {
            let phones = std::mem::take(retained);
            *self = Self::Success(phones);
        }
    }

    /// Replaces the state with `Failure`, keeping whatever list is current.
    pub(crate) fn fail(&mut self, error: RemoteError) {
        let retained = self.phones_mut().map(std::mem::take).unwrap_or_default();
        *self = Self::Failure { error, retained };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Phone> {
        vec![
            Phone::new("1", "Acme", "X", 100.0),
            Phone::new("2", "Acme", "Y", 200.0),
        ]
    }

    #[test]
    fn loading_has_no_list() {
        let state = CollectionState::Loading;
        assert!(state.phones().is_none());
        assert!(state.error().is_none());
    }

    #[test]
    fn fail_keeps_current_list() {
        let mut state = CollectionState::Success(sample());
        state.fail(RemoteError::new(Some(500), "boom"));
        assert!(state.is_failure());
        assert_eq!(state.phones().unwrap().len(), 2);
        assert_eq!(state.error().unwrap().detail(), "boom");
    }

    #[test]
    fn fail_from_loading_retains_nothing() {
        let mut state = CollectionState::Loading;
        state.fail(RemoteError::transport("unreachable"));
        assert_eq!(state.phones().unwrap().len(), 0);
    }

    #[test]
    fn resume_turns_failure_back_into_success() {
        let mut state = CollectionState::Failure {
            error: RemoteError::transport("x"),
            retained: sample(),
        };
        state.resume();
        assert!(state.is_success());
        assert!(state.get(&PhoneId::new("2")).is_some());
    }
}
