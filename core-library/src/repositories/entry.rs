//! Hydrated item detail repository

use crate::error::{LibraryError, Result};
use crate::models::{EntityId, EntryDetail, SourceId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Access to item detail materialized from content providers.
///
/// A library item or history entry can only be shown once its detail row exists.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    async fn find(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<Option<EntryDetail>>;

    async fn upsert(&self, entry: &EntryDetail) -> Result<()>;

    async fn exists(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool>;

    async fn delete(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool>;
}

pub struct SqliteEntryRepository {
    pool: SqlitePool,
}

impl SqliteEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryRepository for SqliteEntryRepository {
    async fn find(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<Option<EntryDetail>> {
        let entry = query_as::<_, EntryDetail>(
            "SELECT * FROM entries WHERE source_id = ? AND entity_id = ?",
        )
        .bind(source_id)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn upsert(&self, entry: &EntryDetail) -> Result<()> {
        entry.validate().map_err(|e| LibraryError::InvalidInput {
            record: "EntryDetail".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO entries (source_id, entity_id, title, author, cover_url, description, url)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_id, entity_id) DO UPDATE SET
                title = excluded.title,
                author = COALESCE(excluded.author, entries.author),
                cover_url = COALESCE(excluded.cover_url, entries.cover_url),
                description = COALESCE(excluded.description, entries.description),
                url = COALESCE(excluded.url, entries.url)
            "#,
        )
        .bind(&entry.source_id)
        .bind(&entry.entity_id)
        .bind(&entry.title)
        .bind(&entry.author)
        .bind(&entry.cover_url)
        .bind(&entry.description)
        .bind(&entry.url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool> {
        let (count,): (i64,) =
            query_as("SELECT COUNT(*) FROM entries WHERE source_id = ? AND entity_id = ?")
                .bind(source_id)
                .bind(entity_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn delete(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool> {
        let result = query("DELETE FROM entries WHERE source_id = ? AND entity_id = ?")
            .bind(source_id)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
