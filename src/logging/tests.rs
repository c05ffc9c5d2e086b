use super::*;
use crate::config::yaml_loader::LoggingYaml;

#[test]
fn bucket_key_groups_by_server_day_level() {
    let record = LogRecord::new(LogLevel::Error, "dispatcher", "tool_fail", "boom")
        .with_server("guild-1");
    let (server, day, level) = record.bucket_key();
    assert_eq!(server, "guild-1");
    assert_eq!(day.len(), 8);
    assert_eq!(level, LogLevel::Error);
}

#[test]
fn bucket_key_defaults_to_global_without_server() {
    let record = LogRecord::new(LogLevel::Info, "gateway", "provider_try", "ok");
    let (server, _, _) = record.bucket_key();
    assert_eq!(server, "_global");
}

#[test]
fn sink_writes_ndjson_per_server_day_level() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingYaml {
        batch_size: 4,
        flush_interval_ms: 20,
        ..Default::default()
    };
    let sink = LoggingSink::start(config, dir.path());

    sink.log(
        LogRecord::new(LogLevel::Warning, "etl", "fetch_retry", "backing off")
            .with_server("guild-9")
            .with_channel("chan-1"),
    );

    // Give the worker thread time to drain and flush.
    std::thread::sleep(std::time::Duration::from_millis(300));
    drop(sink);

    let day = chrono::Utc::now().format("%Y%m%d").to_string();
    let path = dir.path().join("guild-9").join(day).join("bot_log_WARNING.jsonl");
    let content = std::fs::read_to_string(&path).expect("log file should exist");
    assert!(content.contains("fetch_retry"));
    assert!(content.contains("chan-1"));
}

#[test]
fn drop_flushes_remaining_queue() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingYaml {
        batch_size: 50,
        flush_interval_ms: 5000,
        ..Default::default()
    };
    let sink = LoggingSink::start(config, dir.path());
    sink.log(LogRecord::new(LogLevel::Info, "bus", "dispatch", "hi").with_server("guild-2"));
    drop(sink);

    let day = chrono::Utc::now().format("%Y%m%d").to_string();
    let path = dir.path().join("guild-2").join(day).join("bot_log_INFO.jsonl");
    assert!(path.exists(), "drop should flush pending records before the thread exits");
}
