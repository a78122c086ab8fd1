use async_trait::async_trait;

use crate::error::IpcError;
use crate::types::{UiPatch, UiSnapshot};

/// The unit that renders plugin screens on the host side of the boundary.
#[async_trait]
pub trait PresentationUnit: Send + Sync {
    /// Replace the participant's screen with a full snapshot.
    async fn update_ui_state(
        &self,
        participant_id: &str,
        snapshot: &UiSnapshot,
    ) -> Result<(), IpcError>;

    /// Whether [`PresentationUnit::apply_patch`] is usable. Units that only
    /// accept full snapshots keep the default.
    fn supports_patches(&self) -> bool {
        false
    }

    /// Apply a root-level patch against the last snapshot this unit received.
    async fn apply_patch(&self, _participant_id: &str, _patch: &UiPatch) -> Result<(), IpcError> {
        Err(IpcError::not_implemented("apply_patch"))
    }
}
