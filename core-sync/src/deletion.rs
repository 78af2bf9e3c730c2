//! # Explicit Deletion
//!
//! Periodic sync never deletes: a record missing on one side is restored from
//! the other. Deletion is a user action, so it is propagated to the remote in
//! the same operation as the local delete.
//!
//! The local delete always commits first. The remote delete then needs a valid
//! session; without one, or if the remote call fails, the error is returned to
//! the caller while the local delete stands.

use crate::context::LocalStores;
use crate::error::{Result, SyncError};
use crate::remote::RemoteService;
use core_auth::{AuthContext, UserId};
use core_library::{CanonicalId, EntityId, SourceId};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct DeletionService {
    stores: LocalStores,
    remote: Arc<dyn RemoteService>,
    auth: Arc<dyn AuthContext>,
    event_bus: Option<EventBus>,
    timeout: Duration,
}

impl DeletionService {
    pub fn new(
        stores: LocalStores,
        remote: Arc<dyn RemoteService>,
        auth: Arc<dyn AuthContext>,
        timeout: Duration,
    ) -> Self {
        Self {
            stores,
            remote,
            auth,
            event_bus: None,
            timeout,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Remove an item from the library on this device and on the remote.
    ///
    /// A local row without a canonical id may still have been uploaded by
    /// another device, so the identity is looked up remotely before the
    /// remote delete.
    #[instrument(skip(self), fields(source_id = %source_id, entity_id = %entity_id))]
    pub async fn remove_library_item(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<()> {
        let known_id = self
            .stores
            .library
            .find(source_id, entity_id)
            .await?
            .and_then(|item| item.canonical_id);
        let title = self
            .stores
            .entries
            .find(source_id, entity_id)
            .await?
            .map(|detail| detail.title);

        if self.stores.library.delete(source_id, entity_id).await? {
            self.emit(LibraryEvent::LibraryItemRemoved {
                source_id: source_id.to_string(),
                entity_id: entity_id.to_string(),
            });
        }

        let user_id = self.session_user().await?;
        let canonical_id = match known_id {
            Some(id) => Some(id),
            None => {
                self.lookup_canonical_id(&user_id, title.as_deref(), source_id, entity_id)
                    .await?
            }
        };
        let Some(canonical_id) = canonical_id else {
            debug!("Item is not on the remote, skipping remote delete");
            return Ok(());
        };

        self.timed(self.remote.delete_library_item(&user_id, &canonical_id))
            .await?;
        info!(canonical_id = %canonical_id, "Library item removed");
        Ok(())
    }

    /// Uninstall a source on this device and forget it remotely.
    #[instrument(skip(self), fields(source_id = %source_id))]
    pub async fn uninstall_source(&self, source_id: &SourceId) -> Result<()> {
        if self.stores.sources.delete(source_id).await? {
            self.emit(LibraryEvent::SourceRemoved {
                source_id: source_id.to_string(),
            });
        }

        let user_id = self.session_user().await?;
        self.timed(self.remote.delete_source(&user_id, source_id))
            .await?;
        info!("Source uninstalled");
        Ok(())
    }

    /// Clear all reading progress of one item.
    #[instrument(skip(self), fields(source_id = %source_id, entity_id = %entity_id))]
    pub async fn clear_history(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<()> {
        let removed = self
            .stores
            .history
            .delete_for_entity(source_id, entity_id)
            .await?;
        if removed > 0 {
            self.emit(LibraryEvent::HistoryCleared {
                source_id: source_id.to_string(),
                entity_id: entity_id.to_string(),
            });
        }

        let user_id = self.session_user().await?;
        self.timed(self.remote.delete_history(&user_id, source_id, entity_id, None))
            .await?;
        info!(removed, "History cleared");
        Ok(())
    }

    /// Canonical id of an item whose local row never got one.
    ///
    /// Resolving by title is idempotent. Without a stored title the remote
    /// library is searched for the `(source_id, entity_id)` pair.
    async fn lookup_canonical_id(
        &self,
        user_id: &UserId,
        title: Option<&str>,
        source_id: &SourceId,
        entity_id: &EntityId,
    ) -> Result<Option<CanonicalId>> {
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            let call = self.remote.resolve_canonical_id(title, source_id, entity_id);
            return self.timed(call).await.map(Some);
        }

        let remote_items = self.timed(self.remote.list_library(user_id)).await?;
        Ok(remote_items
            .into_iter()
            .find(|item| item.source_id == *source_id && item.entity_id == *entity_id)
            .and_then(|item| item.canonical_id))
    }

    async fn session_user(&self) -> Result<UserId> {
        if !self.auth.is_valid().await {
            return Err(SyncError::AuthRequired);
        }
        self.auth.user_id().await.ok_or(SyncError::AuthRequired)
    }

    async fn timed<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::RemoteUnavailable(format!(
                "remote call timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }
}
