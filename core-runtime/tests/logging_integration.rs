//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::Error;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// Only one global subscriber may be installed per process, so this is the
// single test in the binary that calls `init_logging`.
#[tokio::test]
async fn test_global_init_forwards_to_sink() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(
        target: "core_sync",
        source_id = "en.example",
        chapter = 12.5,
        apikey = "anon-key",
        "History uploaded"
    );
    tracing::debug!(target: "not_a_workspace_crate", "filtered out");

    tokio::time::sleep(Duration::from_millis(50)).await;

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.message, "History uploaded");
    assert_eq!(entry.fields.get("source_id"), Some(&"en.example".to_string()));
    assert_eq!(entry.fields.get("chapter"), Some(&"12.5".to_string()));
    assert_eq!(entry.fields.get("apikey"), Some(&"[REDACTED]".to_string()));

    drop(entries);
    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::LoggingAlreadyInitialized(_))));
}

#[test]
fn test_pii_redaction_tokens() {
    assert_eq!(redact_if_sensitive("access_token", "eyJ..."), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "r-1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("entity_id", "manga-42"), "manga-42");
    assert_eq!(redact_if_sensitive("title", "Berserk"), "Berserk");
    assert_eq!(redact_if_sensitive("user_id", "user_123"), "user_123");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_filter("core_auth=debug,core_sync=trace");

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert_eq!(
        config.filter,
        Some("core_auth=debug,core_sync=trace".to_string())
    );
}
