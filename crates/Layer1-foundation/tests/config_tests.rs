//! Config 파일 로드 테스트

use playground_foundation::{load_json, Error, RunnerConfig};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write");
    file
}

#[test]
fn test_load_runner_config() {
    let file = write_temp(
        r#"{
            "repository": "clickhouse/clickhouse-server",
            "maxExecRetries": 3,
            "execRetryDelayMs": 250,
            "gc": { "triggerFrequencySecs": 120, "imageGcCountThreshold": 5, "imageBufferSize": 2 }
        }"#,
    );

    let config = RunnerConfig::load(file.path()).expect("load");
    assert_eq!(config.exec_attempts(), 3);
    assert_eq!(config.exec_retry_delay(), Duration::from_millis(250));

    let gc = config.gc.expect("gc section");
    assert_eq!(gc.trigger_frequency(), Duration::from_secs(120));
    assert!(gc.container_ttl().is_none());
}

#[test]
fn test_load_rejects_invalid_gc() {
    let file = write_temp(r#"{ "gc": { "triggerFrequencySecs": 0 } }"#);
    assert!(matches!(RunnerConfig::load(file.path()), Err(Error::Config(_))));
}

#[test]
fn test_load_missing_file() {
    let err = RunnerConfig::load("/definitely/not/here.json").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.json"));
}

#[test]
fn test_load_tag_snapshot() {
    let file = write_temp(r#"{ "latest": "sha256:abc", "22.1": "sha256:abc" }"#);
    let tags: HashMap<String, String> = load_json(file.path()).expect("load");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags["latest"], tags["22.1"]);
}
