use bridge_ipc::{ParticipantId, RequestId};
use serde::{Deserialize, Serialize};

/// Why the broker failed a request.
///
/// The `Display` text is what callers see in `Response::error_message`.
/// Callers match on the substrings "too large", "Rate limit", "not found",
/// "queue full" and "timeout", so those stay stable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BrokerError {
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Rate limit exceeded for {sender}: {limit} messages per {window_ms} ms")]
    RateLimited {
        sender: ParticipantId,
        limit: usize,
        window_ms: u64,
    },

    #[error("Receiver not found: {receiver}")]
    ReceiverNotFound { receiver: ParticipantId },

    #[error("Sender not found: {sender}")]
    SenderNotFound { sender: ParticipantId },

    #[error("Permission denied: {sender} may not send {message_type} to {receiver}")]
    PermissionDenied {
        sender: ParticipantId,
        receiver: ParticipantId,
        message_type: String,
    },

    #[error("Message blocked by filter {filter_id}")]
    Blocked { filter_id: String },

    #[error("Message queue full for {receiver} (capacity {capacity})")]
    QueueFull {
        receiver: ParticipantId,
        capacity: usize,
    },

    #[error("Duplicate request id already in flight: {request_id}")]
    DuplicateRequest { request_id: RequestId },

    #[error("Request timeout after {timeout_ms} ms: {request_id}")]
    Timeout {
        request_id: RequestId,
        timeout_ms: u64,
    },

    #[error("Request cancelled before a response arrived: {request_id}")]
    Cancelled { request_id: RequestId },
}

/// Machine-readable classification of a [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    PayloadTooLarge,
    RateLimited,
    ReceiverNotFound,
    SenderNotFound,
    PermissionDenied,
    Blocked,
    QueueFull,
    DuplicateRequest,
    Timeout,
    Cancelled,
}

impl BrokerError {
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::PayloadTooLarge { .. } => RejectReason::PayloadTooLarge,
            Self::RateLimited { .. } => RejectReason::RateLimited,
            Self::ReceiverNotFound { .. } => RejectReason::ReceiverNotFound,
            Self::SenderNotFound { .. } => RejectReason::SenderNotFound,
            Self::PermissionDenied { .. } => RejectReason::PermissionDenied,
            Self::Blocked { .. } => RejectReason::Blocked,
            Self::QueueFull { .. } => RejectReason::QueueFull,
            Self::DuplicateRequest { .. } => RejectReason::DuplicateRequest,
            Self::Timeout { .. } => RejectReason::Timeout,
            Self::Cancelled { .. } => RejectReason::Cancelled,
        }
    }
}
