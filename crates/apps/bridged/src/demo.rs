//! In-process walkthrough: one host, one tally plugin, one recording presentation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_broker::{BrokerStats, MessageBroker};
use bridge_ipc::{
    ComponentNode, Envelope, FlowEngine, IpcError, Message, PresentationRecord,
    RecordingPresentation, Response, ScreenId, UiSnapshot, UserAction,
};
use bridge_sync::{ActionTrigger, SandboxSession, SyncHost};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::BridgeConfig;

pub const HOST_ID: &str = "host";
pub const PLUGIN_ID: &str = "tally-plugin";

#[derive(Debug, Default)]
struct Tally {
    total: i64,
    entries: Vec<String>,
}

/// A plugin counting named entries. `click` on `add` appends one; the
/// `tally` request appends one named by the payload and `echo` mirrors it.
#[derive(Debug, Default)]
pub struct TallyPlugin {
    tally: Mutex<Tally>,
}

impl TallyPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> i64 {
        self.tally.lock().expect("tally mutex poisoned").total
    }

    fn record(&self, name: String) {
        let mut tally = self.tally.lock().expect("tally mutex poisoned");
        tally.total += 1;
        tally.entries.push(name);
    }
}

#[async_trait]
impl FlowEngine for TallyPlugin {
    async fn current_screen(&self) -> Option<ScreenId> {
        Some("tally".into())
    }

    async fn render_snapshot(&self, screen_id: &str) -> Option<UiSnapshot> {
        let tally = self.tally.lock().expect("tally mutex poisoned");
        let mut snapshot = UiSnapshot::new(screen_id, "Tally")
            .with_data("total", tally.total)
            .with_component(
                ComponentNode::new("summary", "text")
                    .with_property("text", format!("{} entries", tally.total)),
            )
            .with_component(ComponentNode::new("add", "button").with_property("label", "Add"));
        for (index, name) in tally.entries.iter().enumerate() {
            snapshot = snapshot.with_component(
                ComponentNode::new(format!("entry-{index}"), "row")
                    .with_property("label", name.as_str())
                    .with_child(ComponentNode::new(format!("entry-{index}-badge"), "badge")),
            );
        }
        Some(snapshot)
    }

    async fn handle_user_action(&self, action: &UserAction) -> Result<(), IpcError> {
        let name = action
            .data
            .get("name")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("entry {}", self.total() + 1));
        self.record(name);
        Ok(())
    }

    async fn handle_inbound_message(&self, message: &Message) -> Response {
        match message.message_type.as_str() {
            "echo" => Response::success(message.request_id.clone(), message.payload.clone()),
            "tally" => {
                self.record(String::from_utf8_lossy(&message.payload).into_owned());
                Response::success(
                    message.request_id.clone(),
                    self.total().to_string().into_bytes(),
                )
            }
            other => Response::failure(
                message.request_id.clone(),
                IpcError::not_implemented(other).to_string(),
            ),
        }
    }
}

/// What the walkthrough observed, printed as JSON by `bridged demo`.
#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub echo: String,
    pub total: i64,
    pub revision: u64,
    pub full_pushes: usize,
    pub patch_pushes: usize,
    /// Encoded envelope bytes of every push, full and patch.
    pub pushed_bytes: usize,
    /// Encoded bytes had every push been a full snapshot.
    pub full_equivalent_bytes: usize,
    pub ignored_actions: usize,
    pub broker: BrokerStats,
}

pub async fn run_demo(config: &BridgeConfig) -> anyhow::Result<DemoReport> {
    config.validate()?;

    let broker = Arc::new(MessageBroker::with_config(config.broker.clone()));
    broker.register(HOST_ID);
    broker.register(PLUGIN_ID);

    let plugin = Arc::new(TallyPlugin::new());
    let presentation = Arc::new(RecordingPresentation::with_patches());
    let session = Arc::new(SandboxSession::new(
        PLUGIN_ID,
        plugin.clone(),
        presentation.clone(),
        config.sync.clone(),
    ));
    session.add_trigger(ActionTrigger::new("click", "add"));

    let host = SyncHost::new();
    host.attach(Arc::clone(&session));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_loop = {
        let session = Arc::clone(&session);
        let broker = Arc::clone(&broker);
        tokio::spawn(async move { session.run(broker, shutdown_rx).await })
    };

    let echo = broker
        .send(Message::new(
            HOST_ID,
            PLUGIN_ID,
            "echo",
            b"hello plugin".to_vec(),
        ))
        .await;
    anyhow::ensure!(echo.success, "echo failed: {}", echo.error_text());

    for name in ["alpha", "beta"] {
        let reply = broker
            .send(Message::new(
                HOST_ID,
                PLUGIN_ID,
                "tally",
                name.as_bytes().to_vec(),
            ))
            .await;
        anyhow::ensure!(reply.success, "tally failed: {}", reply.error_text());
    }

    let mut ignored_actions = 0;
    let actions = [
        UserAction::new("click", "add").with_data("name", "gamma"),
        UserAction::new("hover", "add"),
        UserAction::new("click", "add"),
    ];
    for action in &actions {
        if host.on_user_action(PLUGIN_ID, action).await?.is_none() {
            ignored_actions += 1;
        }
    }

    shutdown_tx.send(true)?;
    sync_loop.await?;
    host.detach(PLUGIN_ID);

    let records = presentation.records();
    let full_pushes = records
        .iter()
        .filter(|(_, r)| matches!(r, PresentationRecord::Full(_)))
        .count();
    let (pushed_bytes, full_equivalent_bytes) = wire_footprint(&records, &presentation)?;
    let report = DemoReport {
        echo: String::from_utf8_lossy(&echo.payload).into_owned(),
        total: plugin.total(),
        revision: session.revision().await,
        full_pushes,
        patch_pushes: records.len() - full_pushes,
        pushed_bytes,
        full_equivalent_bytes,
        ignored_actions,
        broker: broker.stats(),
    };
    log::info!(
        "demo finished: rev={} full={} patch={}",
        report.revision,
        report.full_pushes,
        report.patch_pushes
    );
    Ok(report)
}

/// Size the recorded pushes as they would travel over the wire.
///
/// The full-snapshot equivalent replays patches over the previous screen.
fn wire_footprint(
    records: &[(String, PresentationRecord)],
    presentation: &RecordingPresentation,
) -> anyhow::Result<(usize, usize)> {
    let mut pushed = 0;
    let mut full_equivalent = 0;
    let mut screen: Option<UiSnapshot> = None;
    for (_, record) in records {
        let current = match record {
            PresentationRecord::Full(snapshot) => {
                pushed += Envelope::Snapshot(snapshot.clone()).encode()?.len();
                snapshot.clone()
            }
            PresentationRecord::Patch(patch) => {
                pushed += Envelope::Patch(patch.clone()).encode()?.len();
                let base = screen.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("patch rev={} recorded before any full push", patch.revision)
                })?;
                bridge_sync::apply_verified(patch, base)?
            }
        };
        full_equivalent += Envelope::Snapshot(current.clone()).encode()?.len();
        screen = Some(current);
    }
    if let Some(last) = &screen {
        anyhow::ensure!(
            presentation.screen(PLUGIN_ID).as_ref() == Some(last),
            "replayed screen diverged from the presentation mirror"
        );
    }
    Ok((pushed, full_equivalent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_requests_are_refused() {
        let plugin = TallyPlugin::new();
        let message = Message::new(HOST_ID, PLUGIN_ID, "reboot", Vec::new());
        let response = plugin.handle_inbound_message(&message).await;
        assert!(!response.success);
        assert!(response.error_text().contains("reboot"));
    }

    #[tokio::test]
    async fn actions_name_entries() {
        let plugin = TallyPlugin::new();
        plugin
            .handle_user_action(&UserAction::new("click", "add").with_data("name", "x"))
            .await
            .expect("ok");
        plugin
            .handle_user_action(&UserAction::new("click", "add"))
            .await
            .expect("ok");
        let snapshot = plugin.render_snapshot("tally").await.expect("screen");
        let labels: Vec<_> = snapshot
            .components
            .iter()
            .filter_map(|node| node.properties.get("label").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(labels, vec!["Add", "x", "entry 2"]);
        assert!(snapshot.duplicate_component_ids().is_empty());
    }
}
