use serde::{Deserialize, Serialize};

/// Errors the flow engine and the presentation unit report to a session.
///
/// Broker traffic never surfaces these directly; a failed `send` is a
/// failed [`crate::Response`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum IpcError {
    #[error("not implemented: {method}")]
    NotImplemented { method: String },

    /// The collaborator cannot take the call right now, e.g. a detached UI.
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl IpcError {
    /// Returns `true` when the same call may succeed on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Convenience constructor for `NotImplemented`.
    pub fn not_implemented(method: impl Into<String>) -> Self {
        Self::NotImplemented {
            method: method.into(),
        }
    }

    /// Convenience constructor for `Unavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for `InvalidRequest`.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(IpcError::unavailable("ui detached").is_retryable());
        assert!(!IpcError::invalid("bad patch").is_retryable());
        assert!(!IpcError::not_implemented("apply_patch").is_retryable());
    }

    #[test]
    fn display_carries_context() {
        let err = IpcError::unavailable("ui detached");
        assert_eq!(err.to_string(), "unavailable: ui detached");
    }
}
