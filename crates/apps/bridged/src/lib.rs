//! Host process wiring the plugin message broker to sandbox sync sessions.

pub mod config;
pub mod demo;

pub use config::{BridgeConfig, ConfigError};
pub use demo::{run_demo, DemoReport, TallyPlugin};
