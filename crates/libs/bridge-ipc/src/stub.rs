use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::IpcError;
use crate::traits::*;
use crate::types::*;

/// A flow engine with no screens that refuses every request.
///
/// Starting point for wiring a sandbox before its real engine exists.
pub struct StubFlowEngine;

#[async_trait]
impl FlowEngine for StubFlowEngine {
    async fn current_screen(&self) -> Option<ScreenId> {
        None
    }

    async fn render_snapshot(&self, _screen_id: &str) -> Option<UiSnapshot> {
        None
    }

    async fn handle_user_action(&self, _action: &UserAction) -> Result<(), IpcError> {
        Err(IpcError::not_implemented("handle_user_action"))
    }

    async fn handle_inbound_message(&self, message: &Message) -> Response {
        Response::failure(
            message.request_id.clone(),
            IpcError::not_implemented("handle_inbound_message").to_string(),
        )
    }
}

/// One push observed by [`RecordingPresentation`].
#[derive(Clone, Debug, PartialEq)]
pub enum PresentationRecord {
    Full(UiSnapshot),
    Patch(UiPatch),
}

#[derive(Default)]
struct RecordingState {
    records: Vec<(ParticipantId, PresentationRecord)>,
    screens: HashMap<ParticipantId, UiSnapshot>,
}

/// A presentation unit that keeps every push and mirrors the resulting screen.
///
/// A detached recorder refuses pushes with [`IpcError::Unavailable`] until it
/// is attached again.
#[derive(Default)]
pub struct RecordingPresentation {
    accept_patches: bool,
    detached: AtomicBool,
    state: Mutex<RecordingState>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that advertises patch support and applies patches to its mirror.
    pub fn with_patches() -> Self {
        Self {
            accept_patches: true,
            ..Self::default()
        }
    }

    /// Mark the unit detached (`false`) or attached again (`true`).
    pub fn set_attached(&self, attached: bool) {
        self.detached.store(!attached, Ordering::Relaxed);
    }

    pub fn records(&self) -> Vec<(ParticipantId, PresentationRecord)> {
        self.state
            .lock()
            .expect("recording mutex poisoned")
            .records
            .clone()
    }

    pub fn push_count(&self) -> usize {
        self.state
            .lock()
            .expect("recording mutex poisoned")
            .records
            .len()
    }

    /// The screen as the presentation unit currently shows it.
    pub fn screen(&self, participant_id: &str) -> Option<UiSnapshot> {
        self.state
            .lock()
            .expect("recording mutex poisoned")
            .screens
            .get(participant_id)
            .cloned()
    }

    fn ensure_attached(&self, participant_id: &str) -> Result<(), IpcError> {
        if self.detached.load(Ordering::Relaxed) {
            return Err(IpcError::unavailable(format!(
                "presentation detached, dropping push for {participant_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PresentationUnit for RecordingPresentation {
    async fn update_ui_state(
        &self,
        participant_id: &str,
        snapshot: &UiSnapshot,
    ) -> Result<(), IpcError> {
        self.ensure_attached(participant_id)?;
        let mut state = self.state.lock().expect("recording mutex poisoned");
        state.records.push((
            participant_id.to_string(),
            PresentationRecord::Full(snapshot.clone()),
        ));
        state
            .screens
            .insert(participant_id.to_string(), snapshot.clone());
        Ok(())
    }

    fn supports_patches(&self) -> bool {
        self.accept_patches
    }

    async fn apply_patch(&self, participant_id: &str, patch: &UiPatch) -> Result<(), IpcError> {
        if !self.accept_patches {
            return Err(IpcError::not_implemented("apply_patch"));
        }
        self.ensure_attached(participant_id)?;
        let mut state = self.state.lock().expect("recording mutex poisoned");
        let baseline = state.screens.get(participant_id).ok_or_else(|| {
            IpcError::invalid(format!(
                "patch received before initial render: rev={}",
                patch.revision
            ))
        })?;
        let next = patch.apply(baseline)?;
        state.records.push((
            participant_id.to_string(),
            PresentationRecord::Patch(patch.clone()),
        ));
        state.screens.insert(participant_id.to_string(), next);
        Ok(())
    }
}
