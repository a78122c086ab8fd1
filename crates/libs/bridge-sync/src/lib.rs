//! UI-state synchronization between a plugin sandbox and its presentation unit.
//!
//! A sandbox renders a fresh [`UiSnapshot`](bridge_ipc::UiSnapshot) whenever
//! its model changes. [`SandboxSession`] hashes it, diffs it against the last
//! snapshot it pushed, and sends the presentation unit either the full
//! snapshot or a root-level [`UiPatch`](bridge_ipc::UiPatch). User actions
//! flowing back are matched against the session's triggers before they reach
//! the flow engine.
//!
//! The differ and the hash are pure functions over immutable snapshots and
//! cannot fail.

pub mod config;
pub mod differ;
pub mod error;
pub mod hash;
mod host;
pub mod patch;
mod session;

pub use config::{ConfigError, SyncConfig};
pub use differ::{diff, should_update, DiffResult};
pub use error::SyncError;
pub use hash::calculate_state_hash;
pub use host::SyncHost;
pub use patch::{apply_verified, build_patch};
pub use session::{ActionTrigger, PushMode, SandboxSession, SyncOutcome, SyncTrigger};
