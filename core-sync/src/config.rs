//! Engine tuning

use core_runtime::config::SyncTuning;
use std::time::Duration;

/// Worker pool size and per-call timeouts for one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum item operations in flight within a phase
    pub max_concurrency: usize,
    /// Applied to every remote call separately, never to the run as a whole
    pub remote_call_timeout: Duration,
    /// Applied to each content provider fetch
    pub hydration_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from(&SyncTuning::default())
    }
}

impl From<&SyncTuning> for SyncConfig {
    fn from(tuning: &SyncTuning) -> Self {
        Self {
            max_concurrency: tuning.max_concurrency.max(1),
            remote_call_timeout: tuning.remote_call_timeout(),
            hydration_timeout: tuning.hydration_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_runtime_tuning() {
        let config = SyncConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.remote_call_timeout, Duration::from_secs(30));
        assert_eq!(config.hydration_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_tuning() {
        let tuning = SyncTuning {
            max_concurrency: 8,
            remote_call_timeout_secs: 5,
            hydration_timeout_secs: 12,
        };
        let config = SyncConfig::from(&tuning);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.remote_call_timeout, Duration::from_secs(5));
        assert_eq!(config.hydration_timeout, Duration::from_secs(12));
    }
}
