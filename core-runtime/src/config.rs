//! # Core Configuration Module
//!
//! Builder-based configuration for the reconciliation core.
//!
//! ## Overview
//!
//! [`CoreConfigBuilder`] collects everything the composition root needs (local
//! database location, remote endpoint, worker pool tuning, logging) and
//! validates it before anything is started. Validation is fail-fast and every
//! error message says how to fix it.
//!
//! ## Required settings
//!
//! - `database_path` - SQLite file holding sources, library and history
//! - `remote` - base URL and anon API key of the remote service
//!
//! ## Optional settings
//!
//! - `HttpClient` - injected by mobile hosts; desktop builds fall back to reqwest
//! - `sync` - worker pool size and per-call timeouts
//! - `event_buffer_size` - capacity of the event bus channel
//! - `logging` - [`LoggingConfig`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, RemoteConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/reader.db")
//!     .remote(RemoteConfig::new("https://project.supabase.co", "anon-key"))
//!     .max_concurrency(8)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const MAX_CONCURRENCY_LIMIT: usize = 32;

/// Core configuration. Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Remote service endpoint
    pub remote: RemoteConfig,

    /// Reconciliation worker pool and timeouts
    pub sync: SyncTuning,

    /// Event bus channel capacity
    pub event_buffer_size: usize,

    /// HTTP client (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    pub logging: LoggingConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("remote", &self.remote)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &self.http_client.is_some())
            .field("logging", &self.logging)
            .finish()
    }
}

/// Remote service endpoint and anonymous API key.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project base URL, without a trailing slash
    pub base_url: String,
    /// Anonymous key sent as the `apikey` header on every request
    pub api_key: String,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Checks the URL scheme and that the key is present.
    ///
    /// Plain `http://` is accepted only for `localhost` and `127.0.0.1`.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::Config(
                "Remote base URL cannot be empty. Use RemoteConfig::new(base_url, api_key)."
                    .to_string(),
            ));
        }

        let is_local_http = ["http://localhost", "http://127.0.0.1"]
            .iter()
            .any(|prefix| self.base_url.starts_with(prefix));

        if !self.base_url.starts_with("https://") && !is_local_http {
            return Err(Error::Config(format!(
                "Remote base URL must use https:// (got '{}'). \
                 Plain http is only allowed for localhost during development.",
                self.base_url
            )));
        }

        if self.api_key.trim().is_empty() {
            return Err(Error::Config(
                "Remote API key cannot be empty. Provide the project's anon key.".to_string(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Worker pool size and timeouts applied by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTuning {
    /// Maximum in-flight item operations within one phase
    pub max_concurrency: usize,
    /// Timeout for a single remote call
    pub remote_call_timeout_secs: u64,
    /// Timeout for a single content provider fetch
    pub hydration_timeout_secs: u64,
}

impl SyncTuning {
    pub fn remote_call_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_call_timeout_secs)
    }

    pub fn hydration_timeout(&self) -> Duration {
        Duration::from_secs(self.hydration_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(Error::Config(format!(
                "Sync max_concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY_LIMIT, self.max_concurrency
            )));
        }

        if self.remote_call_timeout_secs == 0 {
            return Err(Error::Config(
                "Remote call timeout must be at least 1 second".to_string(),
            ));
        }

        if self.hydration_timeout_secs == 0 {
            return Err(Error::Config(
                "Hydration timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            remote_call_timeout_secs: 30,
            hydration_timeout_secs: 30,
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.remote.validate()?;
        self.sync.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    remote: Option<RemoteConfig>,
    sync: SyncTuning,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the remote endpoint (required).
    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn sync_tuning(mut self, tuning: SyncTuning) -> Self {
        self.sync = tuning;
        self
    }

    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.sync.max_concurrency = workers;
        self
    }

    pub fn remote_call_timeout_secs(mut self, secs: u64) -> Self {
        self.sync.remote_call_timeout_secs = secs;
        self
    }

    pub fn hydration_timeout_secs(mut self, secs: u64) -> Self {
        self.sync.hydration_timeout_secs = secs;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Injects the host's HTTP client.
    ///
    /// Without one, `core-service` uses its reqwest client when built with the
    /// `desktop-shims` feature and fails otherwise.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required setting is missing or a value
    /// is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let remote = self.remote.ok_or_else(|| {
            Error::Config(
                "Remote endpoint is required. Use .remote(RemoteConfig::new(url, key)) to set it."
                    .to_string(),
            )
        })?;

        let config = CoreConfig {
            database_path,
            remote,
            sync: self.sync,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client: self.http_client,
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteConfig {
        RemoteConfig::new("https://project.supabase.co/", "anon-key")
    }

    fn expect_config_error(result: Result<CoreConfig>, needle: &str) {
        match result {
            Err(Error::Config(message)) => assert!(
                message.contains(needle),
                "expected '{}' in '{}'",
                needle,
                message
            ),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_with_required_fields() {
        let config = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(remote())
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/reader.db"));
        assert_eq!(config.remote.base_url, "https://project.supabase.co");
        assert_eq!(config.sync, SyncTuning::default());
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.http_client.is_none());
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder().remote(remote()).build();
        expect_config_error(result, ".database_path()");
    }

    #[test]
    fn test_builder_requires_remote() {
        let result = CoreConfig::builder().database_path("/tmp/reader.db").build();
        expect_config_error(result, ".remote(");
    }

    #[test]
    fn test_rejects_plain_http_remote() {
        let result = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(RemoteConfig::new("http://project.supabase.co", "anon"))
            .build();
        expect_config_error(result, "https://");
    }

    #[test]
    fn test_accepts_localhost_http_remote() {
        let local = RemoteConfig::new("http://127.0.0.1:54321", "anon");
        assert!(local.validate().is_ok());
        assert!(RemoteConfig::new("http://localhost:54321", "anon")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_rejects_empty_api_key() {
        let result = RemoteConfig::new("https://project.supabase.co", "  ").validate();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_concurrency_bounds() {
        let zero = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(remote())
            .max_concurrency(0)
            .build();
        expect_config_error(zero, "max_concurrency");

        let too_many = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(remote())
            .max_concurrency(33)
            .build();
        expect_config_error(too_many, "max_concurrency");

        let ok = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(remote())
            .max_concurrency(32)
            .remote_call_timeout_secs(5)
            .hydration_timeout_secs(10)
            .build()
            .unwrap();
        assert_eq!(ok.sync.max_concurrency, 32);
        assert_eq!(ok.sync.remote_call_timeout(), Duration::from_secs(5));
        assert_eq!(ok.sync.hydration_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let tuning = SyncTuning {
            remote_call_timeout_secs: 0,
            ..SyncTuning::default()
        };
        assert!(tuning.validate().is_err());

        let tuning = SyncTuning {
            hydration_timeout_secs: 0,
            ..SyncTuning::default()
        };
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let result = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(remote())
            .event_buffer_size(0)
            .build();
        expect_config_error(result, "Event buffer");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(RemoteConfig::new("https://project.supabase.co", "super-secret"))
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = CoreConfig::builder()
            .database_path("/tmp/reader.db")
            .remote(remote())
            .build()
            .unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.remote, config.remote);
    }
}
