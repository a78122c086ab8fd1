use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum estimated payload reduction before a patch is preferred.
pub const DEFAULT_PARTIAL_PUSH_THRESHOLD: f64 = 0.5;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("partial_push_threshold must be within 0.0..=1.0, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
}

/// Tuning for the push loop of a [`SandboxSession`](crate::SandboxSession).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub partial_push_threshold: f64,
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            partial_push_threshold: DEFAULT_PARTIAL_PUSH_THRESHOLD,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.partial_push_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(
                self.partial_push_threshold,
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}
