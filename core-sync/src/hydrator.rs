//! # Metadata Hydration
//!
//! A remote-only library item or history entry carries only `(source_id,
//! entity_id)`. Before it can be written locally its detail has to be fetched
//! from the content source and stored. This is the only place the engine talks
//! to third-party sources; every failure here is item-local.

use crate::error::{Result, SyncError};
use crate::remote::ContentProvider;
use core_library::repositories::{EntryRepository, SourceRepository};
use core_library::{EntityId, EntryDetail, SourceId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct MetadataHydrator {
    provider: Arc<dyn ContentProvider>,
    sources: Arc<dyn SourceRepository>,
    entries: Arc<dyn EntryRepository>,
    timeout: Duration,
}

impl MetadataHydrator {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        sources: Arc<dyn SourceRepository>,
        entries: Arc<dyn EntryRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            sources,
            entries,
            timeout,
        }
    }

    /// Fetch and store the detail of one item.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceNotInstalled`] if the source is not installed locally
    ///   or has no registered provider
    /// - [`SyncError::ContentProviderError`] if the fetch fails or times out
    #[instrument(skip(self), fields(source_id = %source_id, entity_id = %entity_id))]
    pub async fn hydrate(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<EntryDetail> {
        if !self.sources.exists(source_id).await? {
            return Err(SyncError::SourceNotInstalled {
                source_id: source_id.to_string(),
            });
        }

        let fetch = self.provider.fetch_detail(source_id, entity_id);
        let mut detail = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(detail)) => detail,
            Ok(Err(err @ SyncError::SourceNotInstalled { .. })) => return Err(err),
            Ok(Err(err @ SyncError::ContentProviderError(_))) => return Err(err),
            Ok(Err(err)) => return Err(SyncError::ContentProviderError(err.to_string())),
            Err(_) => {
                warn!("Content provider fetch timed out");
                return Err(SyncError::ContentProviderError(format!(
                    "fetch timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        // Stored under the ids that were asked for, whatever the provider echoes.
        detail.source_id = source_id.clone();
        detail.entity_id = entity_id.clone();

        self.entries
            .upsert(&detail)
            .await
            .map_err(|e| SyncError::ContentProviderError(e.to_string()))?;

        debug!(title = %detail.title, "Hydrated item detail");
        Ok(detail)
    }

    /// Hydrate only if no detail is stored yet. Returns whether a fetch happened.
    pub async fn ensure_hydrated(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool> {
        if self.entries.exists(source_id, entity_id).await? {
            return Ok(false);
        }
        self.hydrate(source_id, entity_id).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for MetadataHydrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataHydrator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
