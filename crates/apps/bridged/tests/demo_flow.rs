use std::io::Write;

use bridged::{run_demo, BridgeConfig};

#[tokio::test]
async fn demo_walkthrough_reports_traffic() {
    let _ = env_logger::builder().is_test(true).try_init();
    let report = run_demo(&BridgeConfig::default()).await.expect("demo runs");

    assert_eq!(report.echo, "hello plugin");
    assert_eq!(report.total, 4);
    assert_eq!(report.ignored_actions, 1);
    assert_eq!(report.broker.sent, 3);
    assert_eq!(report.broker.delivered, 3);
    assert_eq!(report.broker.timed_out, 0);
    assert!(report.full_pushes >= 1);
    assert_eq!(
        report.revision as usize,
        report.full_pushes + report.patch_pushes
    );
    assert!(report.pushed_bytes <= report.full_equivalent_bytes);
}

#[tokio::test]
async fn demo_refuses_invalid_config() {
    let mut config = BridgeConfig::default();
    config.sync.partial_push_threshold = 2.0;
    let err = run_demo(&config).await.expect_err("invalid threshold");
    assert!(err.to_string().contains("partial_push_threshold"));
}

#[tokio::test]
async fn configured_filter_blocks_demo_traffic() {
    let config = BridgeConfig::from_toml(
        r#"
        [[broker.filters]]
        filter_id = "no-echo"
        message_type_pattern = "echo"
        action = "block"
        "#,
    )
    .expect("parse");
    let err = run_demo(&config).await.expect_err("echo is blocked");
    assert!(err.to_string().contains("no-echo"), "{err}");
}

#[test]
fn config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[broker]\nrate_limit = 10\n\n[sync]\npoll_interval_ms = 20").expect("write");

    let config = BridgeConfig::from_path(file.path()).expect("load");
    assert_eq!(config.broker.rate_limit, 10);
    assert_eq!(config.sync.poll_interval_ms, 20);
}

#[test]
fn invalid_config_file_is_invalid_data() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[broker]\nqueue_capacity = 0").expect("write");

    let err = BridgeConfig::from_path(file.path()).expect_err("zero capacity");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(err.to_string().contains("queue_capacity"));
}
