//! Message broker for plugin sandboxes.
//!
//! Participants (plugin sandboxes and the host) register with the broker and
//! exchange request/response traffic through it. Every request is checked
//! against a payload size limit, a per-sender sliding-window rate limit and
//! the opt-in [access policy](access), queued on the receiver's bounded
//! inbox, and correlated with exactly one response by request id. A request
//! that is not answered within the configured timeout resolves to a failed
//! [`Response`](bridge_ipc::Response).
//!
//! Failures never escape as panics or `Err` values from
//! [`MessageBroker::send`]; callers branch on `Response::success`.

pub mod access;
mod broker;
pub mod config;
pub mod error;
mod pending;
mod queue;
pub mod rate_limit;
pub mod stats;

pub use access::{FilterAction, MessageFilter, Permissions};
pub use broker::MessageBroker;
pub use config::{BrokerConfig, ConfigError};
pub use error::{BrokerError, RejectReason};
pub use rate_limit::{RateLimiter, RateWindow};
pub use stats::{BrokerStats, ParticipantInfo, RejectionCounts};
