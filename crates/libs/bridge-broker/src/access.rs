//! Sender permissions and message filters checked before a request is queued.
//!
//! Both are opt-in. A sender without a [`Permissions`] entry may reach any
//! registered receiver with any message type; once an entry exists, only
//! what it lists is allowed. Filters are evaluated in insertion order and
//! the first one whose patterns match decides.
//!
//! Patterns are literal ids or contain a single `*` standing for any run of
//! characters, e.g. `"*"`, `"ui.*"` or `"*-plugin"`.

use std::collections::BTreeMap;

use bridge_ipc::{Message, ParticipantId};
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// What a sender may reach. An empty list allows nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Permissions {
    /// Receiver id patterns.
    pub receivers: Vec<String>,
    /// Message type patterns.
    pub message_types: Vec<String>,
}

impl Permissions {
    /// Allow every receiver and message type.
    pub fn unrestricted() -> Self {
        Self {
            receivers: vec!["*".to_string()],
            message_types: vec!["*".to_string()],
        }
    }

    pub fn allows(&self, receiver_id: &str, message_type: &str) -> bool {
        any_matches(&self.receivers, receiver_id) && any_matches(&self.message_types, message_type)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    /// Admit the message without consulting later filters.
    #[default]
    Forward,
    /// Refuse the message.
    Block,
    /// Log the message at info level and keep evaluating.
    Log,
}

/// One rule of the broker's filter chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageFilter {
    pub filter_id: String,
    pub message_type_pattern: String,
    /// Restricts the filter to matching senders; `None` matches all.
    #[serde(default)]
    pub sender_pattern: Option<String>,
    #[serde(default)]
    pub action: FilterAction,
}

impl MessageFilter {
    pub fn new(
        filter_id: impl Into<String>,
        message_type_pattern: impl Into<String>,
        action: FilterAction,
    ) -> Self {
        Self {
            filter_id: filter_id.into(),
            message_type_pattern: message_type_pattern.into(),
            sender_pattern: None,
            action,
        }
    }

    pub fn from_sender(mut self, sender_pattern: impl Into<String>) -> Self {
        self.sender_pattern = Some(sender_pattern.into());
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        matches_pattern(&self.message_type_pattern, &message.message_type)
            && self
                .sender_pattern
                .as_deref()
                .map_or(true, |pattern| matches_pattern(pattern, &message.sender_id))
    }
}

/// Permissions per sender plus the filter chain.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccessPolicy {
    permissions: BTreeMap<ParticipantId, Permissions>,
    filters: Vec<MessageFilter>,
}

impl AccessPolicy {
    pub(crate) fn new(
        permissions: BTreeMap<ParticipantId, Permissions>,
        filters: Vec<MessageFilter>,
    ) -> Self {
        Self {
            permissions,
            filters,
        }
    }

    pub(crate) fn set_permissions(&mut self, sender_id: &str, permissions: Permissions) {
        self.permissions.insert(sender_id.to_string(), permissions);
    }

    pub(crate) fn clear_permissions(&mut self, sender_id: &str) -> bool {
        self.permissions.remove(sender_id).is_some()
    }

    pub(crate) fn permissions(&self, sender_id: &str) -> Option<&Permissions> {
        self.permissions.get(sender_id)
    }

    /// Returns `false` when a filter with the same id was replaced in place.
    pub(crate) fn add_filter(&mut self, filter: MessageFilter) -> bool {
        match self
            .filters
            .iter_mut()
            .find(|existing| existing.filter_id == filter.filter_id)
        {
            Some(existing) => {
                *existing = filter;
                false
            }
            None => {
                self.filters.push(filter);
                true
            }
        }
    }

    pub(crate) fn remove_filter(&mut self, filter_id: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|filter| filter.filter_id != filter_id);
        self.filters.len() != before
    }

    pub(crate) fn filters(&self) -> &[MessageFilter] {
        &self.filters
    }

    /// Permissions first, then the filter chain.
    pub(crate) fn check(&self, message: &Message) -> Result<(), BrokerError> {
        if let Some(permissions) = self.permissions.get(&message.sender_id) {
            if !permissions.allows(&message.receiver_id, &message.message_type) {
                return Err(BrokerError::PermissionDenied {
                    sender: message.sender_id.clone(),
                    receiver: message.receiver_id.clone(),
                    message_type: message.message_type.clone(),
                });
            }
        }

        for filter in self.filters.iter().filter(|filter| filter.matches(message)) {
            match filter.action {
                FilterAction::Forward => return Ok(()),
                FilterAction::Block => {
                    return Err(BrokerError::Blocked {
                        filter_id: filter.filter_id.clone(),
                    })
                }
                FilterAction::Log => log::info!(
                    "broker: filter {} saw {} {} -> {} ({} bytes)",
                    filter.filter_id,
                    message.message_type,
                    message.sender_id,
                    message.receiver_id,
                    message.payload.len()
                ),
            }
        }
        Ok(())
    }
}

fn any_matches(patterns: &[String], value: &str) -> bool {
    patterns.iter().any(|pattern| matches_pattern(pattern, value))
}

/// Match `value` against a literal or single-`*` pattern.
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == value,
        Some((prefix, suffix)) => {
            value.len() >= prefix.len() + suffix.len()
                && value.starts_with(prefix)
                && value.ends_with(suffix)
        }
    }
}
