use bridge_ipc::{ComponentId, IpcError, ParticipantId, ScreenId};

/// Failures of a sync cycle. The differ itself never fails.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("screen {screen_id} repeats component ids: {}", ids.join(", "))]
    DuplicateComponentIds {
        screen_id: ScreenId,
        ids: Vec<ComponentId>,
    },

    #[error("flow engine rejected the action: {0}")]
    Engine(#[source] IpcError),

    #[error("presentation unit rejected the update: {0}")]
    Presentation(#[source] IpcError),

    #[error("no session attached for participant {0}")]
    UnknownParticipant(ParticipantId),
}

impl SyncError {
    /// Returns `true` when the next cycle may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(err) | Self::Presentation(err) => err.is_retryable(),
            Self::DuplicateComponentIds { .. } | Self::UnknownParticipant(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_are_listed() {
        let err = SyncError::DuplicateComponentIds {
            screen_id: "home".into(),
            ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "screen home repeats component ids: a, b");
    }

    #[test]
    fn retryability_follows_the_wrapped_error() {
        assert!(SyncError::Presentation(IpcError::unavailable("ui detached")).is_retryable());
        assert!(!SyncError::Engine(IpcError::invalid("bad action")).is_retryable());
        assert!(!SyncError::UnknownParticipant("ghost".into()).is_retryable());
    }

    #[test]
    fn wrapped_ipc_error_is_the_source() {
        let err = SyncError::Presentation(IpcError::not_implemented("apply_patch"));
        let source = std::error::Error::source(&err).expect("has source");
        assert!(source.to_string().contains("apply_patch"));
    }
}
