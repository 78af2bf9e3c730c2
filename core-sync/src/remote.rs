//! # Remote Seams
//!
//! Interfaces the engine consumes but does not implement:
//!
//! - [`RemoteService`]: the multi-device store. Every upsert has merge
//!   semantics keyed by identity; nothing is a plain insert.
//! - [`ContentProvider`]: fetches full item detail from a content source.
//!
//! [`ContentProviderRegistry`] is the runtime dispatcher hosts register
//! per-source providers with.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use core_auth::UserId;
use core_library::{CanonicalId, EntityId, EntryDetail, HistoryEntry, LibraryItem, Source, SourceId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Typed access to the remote service, one method group per record kind.
///
/// Implementations map transport failures to [`SyncError::RemoteUnavailable`]
/// and rejected credentials to [`SyncError::AuthRequired`].
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn list_sources(&self, user_id: &UserId) -> Result<Vec<Source>>;

    async fn upsert_source(&self, user_id: &UserId, source: &Source) -> Result<Source>;

    async fn delete_source(&self, user_id: &UserId, source_id: &SourceId) -> Result<()>;

    /// Every returned item carries its canonical id.
    async fn list_library(&self, user_id: &UserId) -> Result<Vec<LibraryItem>>;

    /// Upsert keyed by `(user_id, canonical_id)`. The item must have a canonical id.
    async fn upsert_library_item(&self, user_id: &UserId, item: &LibraryItem)
        -> Result<LibraryItem>;

    async fn delete_library_item(&self, user_id: &UserId, canonical_id: &CanonicalId)
        -> Result<()>;

    async fn list_history(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>>;

    /// Upsert keyed by `(user_id, canonical_id, chapter_number)`.
    async fn upsert_history(&self, user_id: &UserId, entry: &HistoryEntry) -> Result<HistoryEntry>;

    /// Delete history of one item, or of a single chapter when `chapter_number` is given.
    async fn delete_history(
        &self,
        user_id: &UserId,
        source_id: &SourceId,
        entity_id: &EntityId,
        chapter_number: Option<f64>,
    ) -> Result<()>;

    /// Idempotent resolve-or-create of the cross-device identity.
    async fn resolve_canonical_id(
        &self,
        title: &str,
        source_id: &SourceId,
        entity_id: &EntityId,
    ) -> Result<CanonicalId>;
}

/// Fetches item detail from a content source.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// # Errors
    ///
    /// [`SyncError::SourceNotInstalled`] when the source is unavailable and
    /// [`SyncError::ContentProviderError`] when the item cannot be fetched.
    async fn fetch_detail(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<EntryDetail>;
}

/// Dispatches [`ContentProvider`] calls to the provider registered for each source.
#[derive(Default)]
pub struct ContentProviderRegistry {
    providers: RwLock<HashMap<SourceId, Arc<dyn ContentProvider>>>,
}

impl ContentProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the provider for `source_id`.
    pub async fn register(&self, source_id: SourceId, provider: Arc<dyn ContentProvider>) {
        debug!(source_id = %source_id, "Registering content provider");
        self.providers.write().await.insert(source_id, provider);
    }

    pub async fn unregister(&self, source_id: &SourceId) -> bool {
        self.providers.write().await.remove(source_id).is_some()
    }

    pub async fn is_registered(&self, source_id: &SourceId) -> bool {
        self.providers.read().await.contains_key(source_id)
    }

    pub async fn registered_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<_> = self.providers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ContentProvider for ContentProviderRegistry {
    async fn fetch_detail(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<EntryDetail> {
        let provider = self
            .providers
            .read()
            .await
            .get(source_id)
            .cloned()
            .ok_or_else(|| SyncError::SourceNotInstalled {
                source_id: source_id.to_string(),
            })?;

        provider.fetch_detail(source_id, entity_id).await
    }
}

impl std::fmt::Debug for ContentProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentProviderRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider;

    #[async_trait]
    impl ContentProvider for StaticProvider {
        async fn fetch_detail(
            &self,
            source_id: &SourceId,
            entity_id: &EntityId,
        ) -> Result<EntryDetail> {
            Ok(EntryDetail::new(
                source_id.clone(),
                entity_id.clone(),
                format!("Title of {}", entity_id),
            ))
        }
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_source() {
        let registry = ContentProviderRegistry::new();
        registry
            .register(SourceId::new("s1"), Arc::new(StaticProvider))
            .await;

        let detail = registry
            .fetch_detail(&SourceId::new("s1"), &EntityId::new("m1"))
            .await
            .unwrap();
        assert_eq!(detail.title, "Title of m1");
        assert_eq!(registry.registered_sources().await, vec![SourceId::new("s1")]);
    }

    #[tokio::test]
    async fn test_unregistered_source_is_not_installed() {
        let registry = ContentProviderRegistry::new();
        registry
            .register(SourceId::new("s1"), Arc::new(StaticProvider))
            .await;
        assert!(registry.unregister(&SourceId::new("s1")).await);

        let result = registry
            .fetch_detail(&SourceId::new("s1"), &EntityId::new("m1"))
            .await;
        assert!(matches!(result, Err(SyncError::SourceNotInstalled { .. })));
        assert!(!registry.is_registered(&SourceId::new("s1")).await);
    }
}
