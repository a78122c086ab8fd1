use bridge_broker::BrokerConfig;
use bridge_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `bridged.toml`: a `[broker]` and a `[sync]` table, both optional.
///
/// The broker's access policy lives under `[broker.permissions.<sender>]`
/// and `[[broker.filters]]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Broker(#[from] bridge_broker::ConfigError),
    #[error(transparent)]
    Sync(#[from] bridge_sync::ConfigError),
}

impl BridgeConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Read, parse and validate a config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        config
            .validate()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate()?;
        self.sync.validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = BridgeConfig::from_toml("").expect("parse");
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.broker.rate_limit, 100);
        assert_eq!(config.broker.request_timeout_ms, 5_000);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            [broker]
            request_timeout_ms = 250

            [sync]
            partial_push_threshold = 0.8
            "#,
        )
        .expect("parse");
        assert_eq!(config.broker.request_timeout_ms, 250);
        assert_eq!(config.broker.max_payload_bytes, 1_048_576);
        assert_eq!(config.sync.partial_push_threshold, 0.8);
        assert_eq!(config.sync.poll_interval_ms, 50);
    }

    #[test]
    fn access_policy_tables_parse() {
        let config = BridgeConfig::from_toml(
            r#"
            [broker.permissions.tally-plugin]
            receivers = ["host"]
            message_types = ["ui.*", "tally"]

            [[broker.filters]]
            filter_id = "audit"
            message_type_pattern = "*"
            action = "log"

            [[broker.filters]]
            filter_id = "no-debug"
            message_type_pattern = "debug.*"
            sender_pattern = "*-plugin"
            action = "block"
            "#,
        )
        .expect("parse");
        let permissions = &config.broker.permissions["tally-plugin"];
        assert!(permissions.allows("host", "ui.refresh"));
        assert!(!permissions.allows("host", "debug.dump"));
        assert_eq!(config.broker.filters.len(), 2);
        assert_eq!(
            config.broker.filters[1].sender_pattern.as_deref(),
            Some("*-plugin")
        );

        let rendered = config.to_toml().expect("render");
        assert_eq!(BridgeConfig::from_toml(&rendered).expect("parse"), config);
    }

    #[test]
    fn unknown_tables_are_rejected() {
        assert!(BridgeConfig::from_toml("[interfaces]\nkind = \"tcp\"").is_err());
    }

    #[test]
    fn validation_reports_the_failing_section() {
        let mut config = BridgeConfig::default();
        config.broker.queue_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Broker(_))));

        let mut config = BridgeConfig::default();
        config.sync.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Sync(_))));
    }

    #[test]
    fn rendered_defaults_parse_back() {
        let rendered = BridgeConfig::default().to_toml().expect("render");
        assert!(rendered.contains("[broker]"));
        assert_eq!(
            BridgeConfig::from_toml(&rendered).expect("parse"),
            BridgeConfig::default()
        );
    }
}
