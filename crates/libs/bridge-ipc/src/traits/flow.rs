use async_trait::async_trait;

use crate::error::IpcError;
use crate::types::*;

/// The declarative flow engine running inside a plugin sandbox.
///
/// The engine owns the plugin's model and navigation state; the bridge only
/// asks it for snapshots and feeds it triggers.
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// Screen the engine is currently showing, `None` before the flow starts.
    async fn current_screen(&self) -> Option<ScreenId>;

    /// Render a fresh snapshot of `screen_id` from the current model.
    async fn render_snapshot(&self, screen_id: &str) -> Option<UiSnapshot>;

    /// Apply a user action that matched one of the session's triggers.
    async fn handle_user_action(&self, action: &UserAction) -> Result<(), IpcError>;

    /// Answer a request delivered through the message broker.
    async fn handle_inbound_message(&self, message: &Message) -> Response;
}
