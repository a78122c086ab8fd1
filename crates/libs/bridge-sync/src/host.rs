use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bridge_broker::MessageBroker;
use bridge_ipc::{ParticipantId, UserAction};

use crate::error::SyncError;
use crate::session::{SandboxSession, SyncOutcome, SyncTrigger};

/// Host-side registry of the sandbox sessions it presents.
#[derive(Default)]
pub struct SyncHost {
    sessions: RwLock<HashMap<ParticipantId, Arc<SandboxSession>>>,
}

impl SyncHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a session is already attached for the participant.
    pub fn attach(&self, session: Arc<SandboxSession>) -> bool {
        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        if sessions.contains_key(session.participant_id()) {
            return false;
        }
        log::info!("host: attached {}", session.participant_id());
        sessions.insert(session.participant_id().to_string(), session);
        true
    }

    pub fn detach(&self, participant_id: &str) -> Option<Arc<SandboxSession>> {
        let removed = self
            .sessions
            .write()
            .expect("sessions lock poisoned")
            .remove(participant_id);
        if removed.is_some() {
            log::info!("host: detached {participant_id}");
        }
        removed
    }

    pub fn session(&self, participant_id: &str) -> Option<Arc<SandboxSession>> {
        self.sessions
            .read()
            .expect("sessions lock poisoned")
            .get(participant_id)
            .cloned()
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .expect("sessions lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn all_sessions(&self) -> Vec<Arc<SandboxSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .expect("sessions lock poisoned")
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.participant_id().cmp(b.participant_id()));
        sessions
    }

    /// Route a user action from the presentation unit to its session.
    pub async fn on_user_action(
        &self,
        participant_id: &str,
        action: &UserAction,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        let session = self
            .session(participant_id)
            .ok_or_else(|| SyncError::UnknownParticipant(participant_id.to_string()))?;
        session.on_user_action(action).await
    }

    /// Re-render and push the current screen of every attached session.
    pub async fn refresh_all(&self) -> Vec<(ParticipantId, Result<SyncOutcome, SyncError>)> {
        let mut outcomes = Vec::new();
        for session in self.all_sessions() {
            let outcome = session.refresh(SyncTrigger::Manual).await;
            outcomes.push((session.participant_id().to_string(), outcome));
        }
        outcomes
    }

    /// Answer queued requests for every attached session. Returns how many
    /// requests were answered in total; failing sessions are logged and skipped.
    pub async fn pump_all(&self, broker: &MessageBroker) -> usize {
        let mut answered = 0;
        for session in self.all_sessions() {
            match session.pump_inbox(broker).await {
                Ok(count) => answered += count,
                Err(err) => log::warn!(
                    "host: pump for {} failed: {err}",
                    session.participant_id()
                ),
            }
        }
        answered
    }
}
