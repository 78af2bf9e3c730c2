//! # Reconciled Record Kinds
//!
//! [`SyncEntity`] is what [`EntitySyncer`](crate::EntitySyncer) is generic
//! over: how to list each side, how to derive the identity key that the two
//! sides are compared by, and how to write one record to either side. The
//! field-level merge comes from [`FieldMerge`].
//!
//! | Kind          | Key                                        |
//! |---------------|--------------------------------------------|
//! | `Source`      | `source_id`                                |
//! | `LibraryItem` | canonical id, resolved on first sync       |
//! | `HistoryEntry`| `(source_id, entity_id, chapter in tenths)`|

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::report::SkipReason;
use async_trait::async_trait;
use core_library::{
    CanonicalId, EntityId, EntityKind, FieldMerge, HistoryEntry, LibraryItem, Source, SourceId,
};
use std::fmt;
use std::hash::Hash;
use tracing::debug;

/// Result of writing a remote-only record to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    Written,
    Skipped(SkipReason),
}

#[async_trait]
pub trait SyncEntity: FieldMerge + Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static;

    fn kind() -> EntityKind;

    async fn list_local(ctx: &SyncContext) -> Result<Vec<Self>>;

    async fn list_remote(ctx: &SyncContext) -> Result<Vec<Self>>;

    /// Key of a record from the remote snapshot.
    fn remote_key(&self) -> Result<Self::Key>;

    /// Human-readable reference used before the key is known.
    fn local_label(&self) -> String;

    /// Derive the key of a local record, resolving its identity if needed.
    /// Returns the record with any newly resolved identity applied.
    async fn resolve_local(self, ctx: &SyncContext) -> Result<(Self::Key, Self)>;

    /// Materialize a remote-only record locally, checking its prerequisites.
    async fn restore_local(&self, ctx: &SyncContext) -> Result<Restore>;

    async fn write_local(&self, ctx: &SyncContext) -> Result<()>;

    async fn push_remote(&self, ctx: &SyncContext) -> Result<()>;
}

// =============================================================================
// Source
// =============================================================================

#[async_trait]
impl SyncEntity for Source {
    type Key = SourceId;

    fn kind() -> EntityKind {
        EntityKind::Source
    }

    async fn list_local(ctx: &SyncContext) -> Result<Vec<Self>> {
        Ok(ctx.stores.sources.list().await?)
    }

    async fn list_remote(ctx: &SyncContext) -> Result<Vec<Self>> {
        ctx.remote_call(ctx.remote.list_sources(&ctx.user_id)).await
    }

    fn remote_key(&self) -> Result<SourceId> {
        Ok(self.source_id.clone())
    }

    fn local_label(&self) -> String {
        self.source_id.to_string()
    }

    async fn resolve_local(self, _ctx: &SyncContext) -> Result<(SourceId, Self)> {
        Ok((self.source_id.clone(), self))
    }

    async fn restore_local(&self, ctx: &SyncContext) -> Result<Restore> {
        // Side-loaded sources cannot be reinstalled from anywhere.
        if self.origin_url.is_none() {
            return Ok(Restore::Skipped(SkipReason::NotRestorable));
        }
        ctx.stores.sources.upsert(self).await?;
        Ok(Restore::Written)
    }

    async fn write_local(&self, ctx: &SyncContext) -> Result<()> {
        Ok(ctx.stores.sources.upsert(self).await?)
    }

    async fn push_remote(&self, ctx: &SyncContext) -> Result<()> {
        ctx.remote_call(ctx.remote.upsert_source(&ctx.user_id, self))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Library items
// =============================================================================

#[async_trait]
impl SyncEntity for LibraryItem {
    type Key = CanonicalId;

    fn kind() -> EntityKind {
        EntityKind::LibraryItem
    }

    async fn list_local(ctx: &SyncContext) -> Result<Vec<Self>> {
        Ok(ctx.stores.library.list().await?)
    }

    async fn list_remote(ctx: &SyncContext) -> Result<Vec<Self>> {
        ctx.remote_call(ctx.remote.list_library(&ctx.user_id)).await
    }

    fn remote_key(&self) -> Result<CanonicalId> {
        self.canonical_id.clone().ok_or_else(|| {
            SyncError::InvalidResponse(format!(
                "library item {}/{} has no canonical id",
                self.source_id, self.entity_id
            ))
        })
    }

    fn local_label(&self) -> String {
        format!("{}/{}", self.source_id, self.entity_id)
    }

    async fn resolve_local(mut self, ctx: &SyncContext) -> Result<(CanonicalId, Self)> {
        if let Some(canonical_id) = &self.canonical_id {
            ctx.identity
                .remember(&self.source_id, &self.entity_id, canonical_id.clone())
                .await;
            return Ok((canonical_id.clone(), self));
        }

        let canonical_id = resolve_identity(ctx, &self.source_id, &self.entity_id).await?;
        ctx.stores
            .library
            .set_canonical_id(&self.source_id, &self.entity_id, &canonical_id)
            .await?;
        ctx.stores
            .history
            .set_canonical_id(&self.source_id, &self.entity_id, &canonical_id)
            .await?;

        self.canonical_id = Some(canonical_id.clone());
        Ok((canonical_id, self))
    }

    async fn restore_local(&self, ctx: &SyncContext) -> Result<Restore> {
        if let Some(reason) = check_prerequisites(ctx, &self.source_id, &self.entity_id).await? {
            return Ok(Restore::Skipped(reason));
        }

        // An unresolved local copy under the same ids is merged, not overwritten.
        let record = match ctx
            .stores
            .library
            .find(&self.source_id, &self.entity_id)
            .await?
        {
            Some(existing) => existing.merge(self),
            None => self.clone(),
        };
        ctx.stores.library.upsert(&record).await?;
        Ok(Restore::Written)
    }

    async fn write_local(&self, ctx: &SyncContext) -> Result<()> {
        Ok(ctx.stores.library.upsert(self).await?)
    }

    async fn push_remote(&self, ctx: &SyncContext) -> Result<()> {
        if self.canonical_id.is_none() {
            return Err(SyncError::IdentityResolutionFailed {
                source_id: self.source_id.to_string(),
                entity_id: self.entity_id.to_string(),
                reason: "no canonical id to upload under".to_string(),
            });
        }
        ctx.remote_call(ctx.remote.upsert_library_item(&ctx.user_id, self))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Reading history
// =============================================================================

/// Identity of one chapter's progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub source_id: SourceId,
    pub entity_id: EntityId,
    /// Chapter number in tenths
    pub chapter_key: i64,
}

impl HistoryKey {
    pub fn of(entry: &HistoryEntry) -> Self {
        Self {
            source_id: entry.source_id.clone(),
            entity_id: entry.entity_id.clone(),
            chapter_key: entry.chapter_key(),
        }
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}#{:.1}",
            self.source_id,
            self.entity_id,
            self.chapter_key as f64 / 10.0
        )
    }
}

#[async_trait]
impl SyncEntity for HistoryEntry {
    type Key = HistoryKey;

    fn kind() -> EntityKind {
        EntityKind::History
    }

    async fn list_local(ctx: &SyncContext) -> Result<Vec<Self>> {
        Ok(ctx.stores.history.list().await?)
    }

    async fn list_remote(ctx: &SyncContext) -> Result<Vec<Self>> {
        ctx.remote_call(ctx.remote.list_history(&ctx.user_id)).await
    }

    fn remote_key(&self) -> Result<HistoryKey> {
        Ok(HistoryKey::of(self))
    }

    fn local_label(&self) -> String {
        HistoryKey::of(self).to_string()
    }

    async fn resolve_local(self, _ctx: &SyncContext) -> Result<(HistoryKey, Self)> {
        // The canonical id is only needed for upload, see `push_remote`.
        Ok((HistoryKey::of(&self), self))
    }

    async fn restore_local(&self, ctx: &SyncContext) -> Result<Restore> {
        if let Some(reason) = check_prerequisites(ctx, &self.source_id, &self.entity_id).await? {
            return Ok(Restore::Skipped(reason));
        }

        let record = match ctx
            .stores
            .history
            .find(&self.source_id, &self.entity_id, self.chapter_number)
            .await?
        {
            Some(existing) => existing.merge(self),
            None => self.clone(),
        };
        ctx.stores.history.upsert(&record).await?;
        Ok(Restore::Written)
    }

    async fn write_local(&self, ctx: &SyncContext) -> Result<()> {
        Ok(ctx.stores.history.upsert(self).await?)
    }

    async fn push_remote(&self, ctx: &SyncContext) -> Result<()> {
        let mut entry = self.clone();
        if entry.canonical_id.is_none() {
            let canonical_id = history_canonical_id(ctx, &entry).await?;
            ctx.stores
                .history
                .set_canonical_id(&entry.source_id, &entry.entity_id, &canonical_id)
                .await?;
            entry.canonical_id = Some(canonical_id);
        }

        ctx.remote_call(ctx.remote.upsert_history(&ctx.user_id, &entry))
            .await
            .map(|_| ())
    }
}

/// Canonical id for a history entry: the resolver cache, then the library
/// item of the same ids, then a fresh resolution.
async fn history_canonical_id(ctx: &SyncContext, entry: &HistoryEntry) -> Result<CanonicalId> {
    if let Some(hit) = ctx.identity.cached(&entry.source_id, &entry.entity_id).await {
        return Ok(hit);
    }

    let from_library = ctx
        .stores
        .library
        .find(&entry.source_id, &entry.entity_id)
        .await?
        .and_then(|item| item.canonical_id);
    if let Some(canonical_id) = from_library {
        ctx.identity
            .remember(&entry.source_id, &entry.entity_id, canonical_id.clone())
            .await;
        return Ok(canonical_id);
    }

    resolve_identity(ctx, &entry.source_id, &entry.entity_id).await
}

/// Resolve through the remote using the stored title.
///
/// Every failure except a missing session becomes
/// [`SyncError::IdentityResolutionFailed`] for this item.
async fn resolve_identity(
    ctx: &SyncContext,
    source_id: &SourceId,
    entity_id: &EntityId,
) -> Result<CanonicalId> {
    let failed = |reason: String| SyncError::IdentityResolutionFailed {
        source_id: source_id.to_string(),
        entity_id: entity_id.to_string(),
        reason,
    };

    let title = match ctx.stores.entries.find(source_id, entity_id).await {
        Ok(Some(detail)) => detail.title,
        Ok(None) => return Err(failed("no stored title".to_string())),
        Err(err) => return Err(failed(err.to_string())),
    };

    match ctx.identity.resolve(&title, source_id, entity_id).await {
        Ok(canonical_id) => Ok(canonical_id),
        Err(SyncError::AuthRequired) => Err(SyncError::AuthRequired),
        Err(err) => Err(failed(err.to_string())),
    }
}

/// `Some(reason)` when a remote-only item cannot be written locally yet.
async fn check_prerequisites(
    ctx: &SyncContext,
    source_id: &SourceId,
    entity_id: &EntityId,
) -> Result<Option<SkipReason>> {
    if !ctx.stores.sources.exists(source_id).await? {
        return Ok(Some(SkipReason::PrerequisiteMissing));
    }

    match ctx.hydrator.ensure_hydrated(source_id, entity_id).await {
        Ok(fetched) => {
            if fetched {
                debug!(source_id = %source_id, entity_id = %entity_id, "Hydrated before restore");
            }
            Ok(None)
        }
        Err(SyncError::SourceNotInstalled { .. }) => Ok(Some(SkipReason::PrerequisiteMissing)),
        Err(SyncError::AuthRequired) => Err(SyncError::AuthRequired),
        Err(_) => Ok(Some(SkipReason::HydrationFailed)),
    }
}
