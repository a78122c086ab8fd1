use std::collections::BTreeMap;
use std::time::Duration;

use bridge_ipc::{
    ParticipantId, DEFAULT_QUEUE_CAPACITY, DEFAULT_TIMEOUT_MS, MAX_PAYLOAD_BYTES, RATE_LIMIT,
    RATE_WINDOW_MS,
};
use serde::{Deserialize, Serialize};

use crate::access::{MessageFilter, Permissions};

/// Broker limits and the initial access policy.
///
/// Every limit defaults to the contract constant of the same name. No
/// permissions and no filters are installed by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub max_payload_bytes: usize,
    pub rate_limit: usize,
    pub rate_window_ms: u64,
    pub request_timeout_ms: u64,
    pub queue_capacity: usize,
    pub filters: Vec<MessageFilter>,
    /// Keyed by sender id.
    pub permissions: BTreeMap<ParticipantId, Permissions>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            rate_limit: RATE_LIMIT,
            rate_window_ms: RATE_WINDOW_MS,
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            filters: Vec::new(),
            permissions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("broker {field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

impl BrokerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_payload_bytes", self.max_payload_bytes as u64),
            ("rate_limit", self.rate_limit as u64),
            ("rate_window_ms", self.rate_window_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("queue_capacity", self.queue_capacity as u64),
        ];
        match limits.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::ZeroLimit { field: *field }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract_constants() {
        let config = BrokerConfig::default();
        assert_eq!(config.max_payload_bytes, 1_048_576);
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.request_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.rate_window(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = BrokerConfig {
            queue_capacity: 0,
            ..BrokerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLimit {
                field: "queue_capacity"
            })
        );
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let config: BrokerConfig =
            serde_json::from_str(r#"{"request_timeout_ms": 250}"#).expect("parse config");
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.rate_limit, RATE_LIMIT);
        assert!(config.permissions.is_empty());
        assert!(config.filters.is_empty());
    }

    #[test]
    fn access_policy_parses() {
        let config: BrokerConfig = serde_json::from_str(
            r#"{
                "permissions": {"tally-plugin": {"receivers": ["host"], "message_types": ["*"]}},
                "filters": [{"filter_id": "audit", "message_type_pattern": "*", "action": "log"}]
            }"#,
        )
        .expect("parse config");
        let permissions = &config.permissions["tally-plugin"];
        assert!(permissions.allows("host", "tally"));
        assert!(!permissions.allows("other-plugin", "tally"));
        assert_eq!(config.filters[0].filter_id, "audit");
    }
}
