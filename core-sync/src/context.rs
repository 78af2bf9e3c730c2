//! Shared state of one sync run

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::hydrator::MetadataHydrator;
use crate::identity::IdentityResolver;
use crate::remote::RemoteService;
use core_auth::UserId;
use core_library::repositories::{
    EntryRepository, HistoryRepository, LibraryItemRepository, SourceRepository,
};
use std::future::Future;
use std::sync::Arc;

/// The local store, one repository per record kind.
#[derive(Clone)]
pub struct LocalStores {
    pub sources: Arc<dyn SourceRepository>,
    pub entries: Arc<dyn EntryRepository>,
    pub library: Arc<dyn LibraryItemRepository>,
    pub history: Arc<dyn HistoryRepository>,
}

impl std::fmt::Debug for LocalStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStores").finish_non_exhaustive()
    }
}

/// Everything a syncer needs, built fresh for each run.
pub struct SyncContext {
    pub user_id: UserId,
    pub remote: Arc<dyn RemoteService>,
    pub stores: LocalStores,
    pub identity: Arc<IdentityResolver>,
    pub hydrator: Arc<MetadataHydrator>,
    pub config: SyncConfig,
}

impl SyncContext {
    /// Await a remote call under the per-call timeout.
    ///
    /// A call that times out is reported as [`SyncError::RemoteUnavailable`].
    pub async fn remote_call<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.config.remote_call_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::RemoteUnavailable(format!(
                "remote call timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("user_id", &self.user_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
