use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::IpcError;

// ── Type aliases ──────────────────────────────────────────────────────────────

/// Identifier of a registered broker participant (plugin sandbox or host).
pub type ParticipantId = String;

/// Hex-encoded request correlation identifier.
pub type RequestId = String;

/// Identifier of a plugin screen.
pub type ScreenId = String;

/// Identifier of a component, unique within one snapshot.
pub type ComponentId = String;

/// String-keyed map of scalar values, ordered so encodings are stable.
pub type PropertyMap = BTreeMap<String, ScalarValue>;

/// Milliseconds since the Unix epoch, zero if the clock is before it.
pub fn now_epoch_ms() -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    i64::try_from(millis).unwrap_or(i64::MAX)
}

/// Fresh random 16-byte request id, hex encoded.
pub fn new_request_id() -> RequestId {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Scalars ───────────────────────────────────────────────────────────────────

/// Bit pattern under which two floats count as the same value.
///
/// `-0.0` folds into `0.0` and every NaN folds into one quiet NaN, so a
/// re-rendered NaN compares and hashes equal to the previous one.
pub fn canonical_float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

/// A scalar property value. Component properties and side-channel data only
/// hold scalars so snapshots stay flat and transport-safe.
///
/// Floats compare by [`canonical_float_bits`], which makes equality
/// reflexive for NaN.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                canonical_float_bits(*a) == canonical_float_bits(*b)
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ScalarValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

// ── Broker records ────────────────────────────────────────────────────────────

/// A request travelling through the message broker.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub message_type: String,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    pub request_id: RequestId,
    pub timestamp: i64,
}

impl Message {
    /// Create a message with a random request id, stamped with the current time.
    pub fn new(
        sender_id: impl Into<ParticipantId>,
        receiver_id: impl Into<ParticipantId>,
        message_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self::with_request_id(sender_id, receiver_id, message_type, payload, new_request_id())
    }

    /// Create a message with a caller-chosen request id.
    pub fn with_request_id(
        sender_id: impl Into<ParticipantId>,
        receiver_id: impl Into<ParticipantId>,
        message_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        request_id: impl Into<RequestId>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            message_type: message_type.into(),
            payload: payload.into(),
            request_id: request_id.into(),
            timestamp: now_epoch_ms(),
        }
    }
}

/// Resolution of a pending request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    pub error_message: Option<String>,
}

impl Response {
    pub fn success(request_id: impl Into<RequestId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            payload: payload.into(),
            error_message: None,
        }
    }

    pub fn failure(request_id: impl Into<RequestId>, error_message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            payload: Vec::new(),
            error_message: Some(error_message.into()),
        }
    }

    /// The failure text, or an empty string for successful responses.
    pub fn error_text(&self) -> &str {
        self.error_message.as_deref().unwrap_or("")
    }
}

// ── UI tree ───────────────────────────────────────────────────────────────────

/// One node of a plugin screen's component tree.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentNode {
    pub id: ComponentId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub children: Vec<ComponentNode>,
}

impl ComponentNode {
    pub fn new(id: impl Into<ComponentId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: PropertyMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ComponentNode) -> Self {
        self.children.push(child);
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(ComponentNode::subtree_len).sum::<usize>()
    }
}

/// An immutable, fully rendered plugin screen.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiSnapshot {
    pub screen_id: ScreenId,
    pub title: String,
    #[serde(default)]
    pub data: PropertyMap,
    #[serde(default)]
    pub components: Vec<ComponentNode>,
    pub timestamp: i64,
}

impl UiSnapshot {
    pub fn new(screen_id: impl Into<ScreenId>, title: impl Into<String>) -> Self {
        Self {
            screen_id: screen_id.into(),
            title: title.into(),
            data: PropertyMap::new(),
            components: Vec::new(),
            timestamp: now_epoch_ms(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_component(mut self, component: ComponentNode) -> Self {
        self.components.push(component);
        self
    }

    pub fn root_ids(&self) -> Vec<ComponentId> {
        self.components.iter().map(|node| node.id.clone()).collect()
    }

    pub fn root(&self, id: &str) -> Option<&ComponentNode> {
        self.components.iter().find(|node| node.id == id)
    }

    /// Total number of nodes across every root subtree.
    pub fn node_count(&self) -> usize {
        self.components.iter().map(ComponentNode::subtree_len).sum()
    }

    /// Ids that occur more than once anywhere in the tree, in first-repeat order.
    pub fn duplicate_component_ids(&self) -> Vec<ComponentId> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let mut stack: Vec<&ComponentNode> = self.components.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id.as_str()) && !duplicates.contains(&node.id) {
                duplicates.push(node.id.clone());
            }
            stack.extend(node.children.iter().rev());
        }
        duplicates
    }
}

// ── Partial pushes ────────────────────────────────────────────────────────────

/// SHA-256 digest of a snapshot's canonical content.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StateHash(pub [u8; 32]);

impl StateHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Root-level delta between a baseline snapshot and its successor.
///
/// `order` lists every root id of the successor so the presentation unit can
/// rebuild the exact root ordering; `upserted` carries only the roots that
/// were added or changed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiPatch {
    pub screen_id: ScreenId,
    pub revision: u64,
    pub base_hash: StateHash,
    pub title: Option<String>,
    pub data: Option<PropertyMap>,
    #[serde(default)]
    pub upserted: Vec<ComponentNode>,
    #[serde(default)]
    pub removed: Vec<ComponentId>,
    #[serde(default)]
    pub order: Vec<ComponentId>,
    pub timestamp: i64,
}

impl UiPatch {
    /// Rebuild the successor snapshot from `baseline`.
    pub fn apply(&self, baseline: &UiSnapshot) -> Result<UiSnapshot, IpcError> {
        if baseline.screen_id != self.screen_id {
            return Err(IpcError::invalid(format!(
                "patch for screen {} applied to screen {}",
                self.screen_id, baseline.screen_id
            )));
        }

        let mut roots: HashMap<&str, &ComponentNode> = baseline
            .components
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();
        for id in &self.removed {
            roots.remove(id.as_str());
        }
        for node in &self.upserted {
            roots.insert(node.id.as_str(), node);
        }

        let mut components = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let node = roots.get(id.as_str()).ok_or_else(|| {
                IpcError::invalid(format!("patch orders unknown component {id}"))
            })?;
            components.push((*node).clone());
        }

        Ok(UiSnapshot {
            screen_id: self.screen_id.clone(),
            title: self.title.clone().unwrap_or_else(|| baseline.title.clone()),
            data: self.data.clone().unwrap_or_else(|| baseline.data.clone()),
            components,
            timestamp: self.timestamp,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.data.is_none()
            && self.upserted.is_empty()
            && self.removed.is_empty()
    }
}

// ── User actions ──────────────────────────────────────────────────────────────

/// A user interaction forwarded from the presentation unit.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAction {
    pub action_type: String,
    pub target_id: ComponentId,
    #[serde(default)]
    pub data: PropertyMap,
    pub timestamp: i64,
}

impl UserAction {
    pub fn new(action_type: impl Into<String>, target_id: impl Into<ComponentId>) -> Self {
        Self {
            action_type: action_type.into(),
            target_id: target_id.into(),
            data: PropertyMap::new(),
            timestamp: now_epoch_ms(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_screen() -> UiSnapshot {
        UiSnapshot::new("settings", "Settings")
            .with_component(ComponentNode::new("header", "text").with_property("text", "Network"))
            .with_component(
                ComponentNode::new("form", "column")
                    .with_child(
                        ComponentNode::new("host", "input").with_property("value", "10.0.0.1"),
                    )
                    .with_child(ComponentNode::new("save", "button")),
            )
    }

    #[test]
    fn request_ids_are_random_hex() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn response_constructors() {
        let ok = Response::success("r1", b"pong".to_vec());
        assert!(ok.success);
        assert_eq!(ok.error_text(), "");

        let failed = Response::failure("r1", "Receiver not found: dns");
        assert!(!failed.success);
        assert!(failed.payload.is_empty());
        assert!(failed.error_text().contains("not found"));
    }

    #[test]
    fn node_count_covers_nested_children() {
        assert_eq!(settings_screen().node_count(), 4);
    }

    #[test]
    fn duplicate_ids_found_across_depths() {
        let snapshot = settings_screen().with_component(
            ComponentNode::new("footer", "row").with_child(ComponentNode::new("host", "text")),
        );
        assert_eq!(snapshot.duplicate_component_ids(), vec!["host".to_string()]);
        assert!(settings_screen().duplicate_component_ids().is_empty());
    }

    #[test]
    fn patch_rebuilds_successor_order() {
        let baseline = settings_screen();
        let patch = UiPatch {
            screen_id: "settings".into(),
            revision: 2,
            title: Some("Settings (edited)".into()),
            upserted: vec![
                ComponentNode::new("banner", "text").with_property("text", "Saved"),
            ],
            removed: vec!["header".into()],
            order: vec!["banner".into(), "form".into()],
            ..UiPatch::default()
        };

        let next = patch.apply(&baseline).expect("patch applies");
        assert_eq!(next.title, "Settings (edited)");
        assert_eq!(next.root_ids(), vec!["banner".to_string(), "form".to_string()]);
        assert_eq!(next.root("form"), baseline.root("form"));
    }

    #[test]
    fn patch_rejects_foreign_screen_and_unknown_ids() {
        let baseline = settings_screen();
        let wrong_screen = UiPatch {
            screen_id: "about".into(),
            ..UiPatch::default()
        };
        assert!(matches!(
            wrong_screen.apply(&baseline),
            Err(IpcError::InvalidRequest { .. })
        ));

        let dangling = UiPatch {
            screen_id: "settings".into(),
            order: vec!["ghost".into()],
            ..UiPatch::default()
        };
        assert!(matches!(
            dangling.apply(&baseline),
            Err(IpcError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn floats_compare_by_canonical_bits() {
        assert_eq!(ScalarValue::Float(f64::NAN), ScalarValue::Float(f64::NAN));
        assert_eq!(ScalarValue::Float(-f64::NAN), ScalarValue::Float(f64::NAN));
        assert_eq!(ScalarValue::Float(-0.0), ScalarValue::Float(0.0));
        assert_ne!(ScalarValue::Float(1.0), ScalarValue::Int(1));

        let node = ComponentNode::new("gauge", "meter").with_property("value", f64::NAN);
        assert_eq!(node, node.clone());
    }

    #[test]
    fn snapshot_serializes_type_tag() {
        let json = serde_json::to_value(settings_screen()).expect("serialize snapshot");
        assert_eq!(json["components"][0]["type"], "text");
        assert_eq!(json["components"][0]["properties"]["text"], "Network");
    }
}
