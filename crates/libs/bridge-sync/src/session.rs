use std::sync::{Arc, Mutex};

use bridge_broker::MessageBroker;
use bridge_ipc::{
    ComponentId, FlowEngine, ParticipantId, PresentationUnit, StateHash, UiSnapshot, UserAction,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::differ::{diff, should_update, DiffResult};
use crate::error::SyncError;
use crate::hash::calculate_state_hash;
use crate::patch::build_patch;

/// A user action the session forwards to its flow engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionTrigger {
    pub action_type: String,
    pub target_id: ComponentId,
}

impl ActionTrigger {
    pub fn new(action_type: impl Into<String>, target_id: impl Into<ComponentId>) -> Self {
        Self {
            action_type: action_type.into(),
            target_id: target_id.into(),
        }
    }

    pub fn matches(&self, action: &UserAction) -> bool {
        self.action_type == action.action_type && self.target_id == action.target_id
    }
}

/// What caused a sync cycle. Logged and reported back in
/// [`SyncOutcome::Pushed`]; it never changes what is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Initial,
    UserAction,
    InboundMessage,
    Timer,
    /// Requested by the host, e.g. [`SyncHost::refresh_all`](crate::SyncHost::refresh_all).
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushMode {
    Full,
    Patch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Pushed {
        revision: u64,
        mode: PushMode,
        trigger: SyncTrigger,
        diff: DiffResult,
    },
    /// The rendered snapshot matches the last one pushed.
    Unchanged,
    /// The engine has no screen to render yet.
    NoScreen,
}

#[derive(Default)]
struct Baseline {
    snapshot: Option<UiSnapshot>,
    hash: Option<StateHash>,
    revision: u64,
}

/// Pairs one sandboxed flow engine with the presentation unit showing it.
///
/// The session remembers the last snapshot it pushed. Each cycle renders the
/// engine's current screen, skips it when the content hash is unchanged and
/// otherwise pushes either the full snapshot or a patch against that baseline.
/// Cycles on one session are serialized.
pub struct SandboxSession {
    participant_id: ParticipantId,
    engine: Arc<dyn FlowEngine>,
    presentation: Arc<dyn PresentationUnit>,
    config: SyncConfig,
    triggers: Mutex<Vec<ActionTrigger>>,
    baseline: tokio::sync::Mutex<Baseline>,
}

impl SandboxSession {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        engine: Arc<dyn FlowEngine>,
        presentation: Arc<dyn PresentationUnit>,
        config: SyncConfig,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            engine,
            presentation,
            config,
            triggers: Mutex::new(Vec::new()),
            baseline: tokio::sync::Mutex::new(Baseline::default()),
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns `false` if an identical trigger is already registered.
    pub fn add_trigger(&self, trigger: ActionTrigger) -> bool {
        let mut triggers = self.triggers.lock().expect("triggers mutex poisoned");
        if triggers.contains(&trigger) {
            return false;
        }
        triggers.push(trigger);
        true
    }

    pub fn remove_trigger(&self, trigger: &ActionTrigger) -> bool {
        let mut triggers = self.triggers.lock().expect("triggers mutex poisoned");
        let before = triggers.len();
        triggers.retain(|t| t != trigger);
        triggers.len() != before
    }

    pub fn matches_trigger(&self, action: &UserAction) -> bool {
        self.triggers
            .lock()
            .expect("triggers mutex poisoned")
            .iter()
            .any(|trigger| trigger.matches(action))
    }

    /// Revision of the last push, `0` before the first one.
    pub async fn revision(&self) -> u64 {
        self.baseline.lock().await.revision
    }

    pub async fn last_pushed(&self) -> Option<UiSnapshot> {
        self.baseline.lock().await.snapshot.clone()
    }

    /// Forget the baseline so the next cycle pushes a full snapshot.
    ///
    /// Call this when the presentation unit lost its state, e.g. after a
    /// reconnect. The revision counter keeps counting.
    pub async fn reset_baseline(&self) {
        let mut baseline = self.baseline.lock().await;
        baseline.snapshot = None;
        baseline.hash = None;
    }

    /// Run one sync cycle.
    pub async fn refresh(&self, trigger: SyncTrigger) -> Result<SyncOutcome, SyncError> {
        let mut baseline = self.baseline.lock().await;

        let Some(screen_id) = self.engine.current_screen().await else {
            return Ok(SyncOutcome::NoScreen);
        };
        let Some(snapshot) = self.engine.render_snapshot(&screen_id).await else {
            log::debug!(
                "sync[{}]: engine rendered nothing for {screen_id}",
                self.participant_id
            );
            return Ok(SyncOutcome::NoScreen);
        };

        let duplicates = snapshot.duplicate_component_ids();
        if !duplicates.is_empty() {
            return Err(SyncError::DuplicateComponentIds {
                screen_id: snapshot.screen_id,
                ids: duplicates,
            });
        }

        let hash = calculate_state_hash(&snapshot);
        if baseline.hash == Some(hash) {
            log::trace!(
                "sync[{}]: {trigger:?} left {screen_id} unchanged",
                self.participant_id
            );
            return Ok(SyncOutcome::Unchanged);
        }

        let result = diff(baseline.snapshot.as_ref(), &snapshot);
        if !should_update(&result) {
            // Only ordering moved; the id-keyed diff does not count that.
            log::trace!(
                "sync[{}]: {trigger:?} reordered {screen_id}",
                self.participant_id
            );
            return Ok(SyncOutcome::Unchanged);
        }

        let revision = baseline.revision + 1;
        let mode = self.push(&baseline, &snapshot, &result, revision).await?;

        log::debug!(
            "sync[{}]: {trigger:?} pushed {screen_id} rev={revision} as {mode:?} \
             (+{} -{} ~{}, reduction {:.2})",
            self.participant_id,
            result.added_component_ids.len(),
            result.removed_component_ids.len(),
            result.changed_component_ids.len(),
            result.estimated_payload_reduction
        );

        baseline.snapshot = Some(snapshot);
        baseline.hash = Some(hash);
        baseline.revision = revision;
        Ok(SyncOutcome::Pushed {
            revision,
            mode,
            trigger,
            diff: result,
        })
    }

    async fn push(
        &self,
        baseline: &Baseline,
        snapshot: &UiSnapshot,
        result: &DiffResult,
        revision: u64,
    ) -> Result<PushMode, SyncError> {
        let patchable = match (&baseline.snapshot, baseline.hash) {
            (Some(previous), Some(base_hash))
                if previous.screen_id == snapshot.screen_id
                    && self.presentation.supports_patches()
                    && result.estimated_payload_reduction >= self.config.partial_push_threshold =>
            {
                Some(build_patch(previous, base_hash, snapshot, result, revision))
            }
            _ => None,
        };

        if let Some(patch) = patchable {
            match self
                .presentation
                .apply_patch(&self.participant_id, &patch)
                .await
            {
                Ok(()) => return Ok(PushMode::Patch),
                Err(err) => log::warn!(
                    "sync[{}]: patch rev={revision} rejected, falling back to full push: {err}",
                    self.participant_id
                ),
            }
        }

        self.presentation
            .update_ui_state(&self.participant_id, snapshot)
            .await
            .map_err(SyncError::Presentation)?;
        Ok(PushMode::Full)
    }

    /// Forward `action` to the engine if a trigger matches, then sync.
    ///
    /// Returns `Ok(None)` when no trigger matched.
    pub async fn on_user_action(
        &self,
        action: &UserAction,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        if !self.matches_trigger(action) {
            log::debug!(
                "sync[{}]: ignoring {} on {}",
                self.participant_id,
                action.action_type,
                action.target_id
            );
            return Ok(None);
        }
        self.engine
            .handle_user_action(action)
            .await
            .map_err(SyncError::Engine)?;
        self.refresh(SyncTrigger::UserAction).await.map(Some)
    }

    /// Answer every request queued for this participant, then sync if any
    /// were handled. Returns the number of requests answered.
    pub async fn pump_inbox(&self, broker: &MessageBroker) -> Result<usize, SyncError> {
        let inbox = broker.receive_messages(&self.participant_id);
        if inbox.is_empty() {
            return Ok(0);
        }

        for message in &inbox {
            let mut response = self.engine.handle_inbound_message(message).await;
            if response.request_id != message.request_id {
                log::warn!(
                    "sync[{}]: engine answered {} with request id {}",
                    self.participant_id,
                    message.request_id,
                    response.request_id
                );
                response.request_id = message.request_id.clone();
            }
            if !broker.respond(response) {
                log::debug!(
                    "sync[{}]: requester of {} stopped waiting",
                    self.participant_id,
                    message.request_id
                );
            }
        }

        self.refresh(SyncTrigger::InboundMessage).await?;
        Ok(inbox.len())
    }

    /// Drive the session until `shutdown` flips to `true`.
    ///
    /// Each tick answers queued requests and re-renders the current screen.
    /// Cycle failures are logged and do not stop the loop; retryable ones
    /// only at debug level since the next tick tries again.
    pub async fn run(&self, broker: Arc<MessageBroker>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        log::info!("sync[{}]: loop started", self.participant_id);

        if let Err(err) = self.refresh(SyncTrigger::Initial).await {
            self.log_cycle_failure("initial render", &err);
        }

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    let cycle = match self.pump_inbox(&broker).await {
                        Ok(0) => self.refresh(SyncTrigger::Timer).await.map(|_| ()),
                        Ok(_) => Ok(()),
                        Err(err) => Err(err),
                    };
                    if let Err(err) = cycle {
                        self.log_cycle_failure("cycle", &err);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        log::info!("sync[{}]: loop stopped", self.participant_id);
    }

    fn log_cycle_failure(&self, what: &str, err: &SyncError) {
        if err.is_retryable() {
            log::debug!("sync[{}]: {what} deferred: {err}", self.participant_id);
        } else {
            log::warn!("sync[{}]: {what} failed: {err}", self.participant_id);
        }
    }
}
