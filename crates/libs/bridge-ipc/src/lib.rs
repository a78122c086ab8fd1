//! Boundary contract between the host, plugin sandboxes and plugin UI units.
//!
//! This crate is shared by every unit of execution that takes part in the
//! bridge. It provides:
//!
//! - **Boundary records** ([`Message`], [`Response`], [`UiSnapshot`],
//!   [`ComponentNode`], [`UiPatch`], [`UserAction`]) that are flat serde
//!   values with no live references, so they cross a process boundary as-is
//! - **Collaborator traits** for the pieces that live outside the bridge:
//!   the flow engine that renders screens and the presentation unit that
//!   shows them
//! - **Stub collaborators** for wiring and tests
//! - **A binary wire envelope** for moving records over a byte transport
//!
//! # Contract constants
//!
//! [`MAX_PAYLOAD_BYTES`], [`RATE_LIMIT`], [`RATE_WINDOW_MS`] and
//! [`DEFAULT_TIMEOUT_MS`] are part of the observable behavior of the broker
//! and are shared here so both sides of the boundary agree on them.

pub mod error;
pub mod traits;
pub mod types;
pub mod wire;

pub use error::IpcError;
pub use traits::{FlowEngine, PresentationUnit};
pub use types::*;
pub use wire::{Envelope, EnvelopeKind, WireError};

mod stub;
pub use stub::{PresentationRecord, RecordingPresentation, StubFlowEngine};

/// Largest payload a single broker message may carry (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1_048_576;

/// Messages a participant may send within one rate window.
pub const RATE_LIMIT: usize = 100;

/// Length of the sliding rate-limit window.
pub const RATE_WINDOW_MS: u64 = 1_000;

/// How long `send` waits for a response before giving up.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Inbound messages a participant's queue holds before `send` is refused.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;
