//! Reading history repository
//!
//! Entries are keyed by `(source_id, entity_id, chapter_key)`. Chapter ids are
//! not stable across devices, so two entries for "the same chapter" are the
//! ones whose chapter numbers agree to one decimal place.

use crate::error::{LibraryError, Result};
use crate::models::{chapter_key, CanonicalId, EntityId, HistoryEntry, SourceId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Reading history data access
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<HistoryEntry>>;

    async fn list_for_entity(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
    ) -> Result<Vec<HistoryEntry>>;

    /// Entry whose chapter number matches `chapter_number` at one decimal.
    async fn find(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
        chapter_number: f64,
    ) -> Result<Option<HistoryEntry>>;

    async fn upsert(&self, entry: &HistoryEntry) -> Result<()>;

    /// Record the canonical id on every entry of one item. Returns rows touched.
    async fn set_canonical_id(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
        canonical_id: &CanonicalId,
    ) -> Result<u64>;

    /// Remove all entries of one item. Returns rows deleted.
    async fn delete_for_entity(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<u64>;
}

pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let entries = query_as::<_, HistoryEntry>(
            "SELECT * FROM history_entries ORDER BY source_id, entity_id, chapter_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn list_for_entity(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
    ) -> Result<Vec<HistoryEntry>> {
        let entries = query_as::<_, HistoryEntry>(
            r#"
            SELECT * FROM history_entries
            WHERE source_id = ? AND entity_id = ?
            ORDER BY chapter_key
            "#,
        )
        .bind(source_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn find(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
        chapter_number: f64,
    ) -> Result<Option<HistoryEntry>> {
        let entry = query_as::<_, HistoryEntry>(
            r#"
            SELECT * FROM history_entries
            WHERE source_id = ? AND entity_id = ? AND chapter_key = ?
            "#,
        )
        .bind(source_id)
        .bind(entity_id)
        .bind(chapter_key(chapter_number))
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn upsert(&self, entry: &HistoryEntry) -> Result<()> {
        entry.validate().map_err(|e| LibraryError::InvalidInput {
            record: "HistoryEntry".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO history_entries (
                source_id, entity_id, chapter_key, chapter_number, canonical_id,
                chapter_title, page_number, total_pages, completed, last_read_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_id, entity_id, chapter_key) DO UPDATE SET
                chapter_number = excluded.chapter_number,
                canonical_id = COALESCE(excluded.canonical_id, history_entries.canonical_id),
                chapter_title = excluded.chapter_title,
                page_number = excluded.page_number,
                total_pages = excluded.total_pages,
                completed = excluded.completed,
                last_read_at = excluded.last_read_at
            "#,
        )
        .bind(&entry.source_id)
        .bind(&entry.entity_id)
        .bind(entry.chapter_key())
        .bind(entry.chapter_number)
        .bind(&entry.canonical_id)
        .bind(&entry.chapter_title)
        .bind(entry.page_number)
        .bind(entry.total_pages)
        .bind(entry.completed)
        .bind(entry.last_read_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_canonical_id(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
        canonical_id: &CanonicalId,
    ) -> Result<u64> {
        let result = query(
            "UPDATE history_entries SET canonical_id = ? WHERE source_id = ? AND entity_id = ?",
        )
        .bind(canonical_id)
        .bind(source_id)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_entity(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<u64> {
        let result = query("DELETE FROM history_entries WHERE source_id = ? AND entity_id = ?")
            .bind(source_id)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    async fn setup_repo() -> SqliteHistoryRepository {
        SqliteHistoryRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_chapters_match_at_one_decimal() {
        let repo = setup_repo().await;
        let mut entry = HistoryEntry::new("s1", "m1", 12.0, t(0));
        entry.page_number = 4;
        entry.total_pages = 30;
        repo.upsert(&entry).await.unwrap();

        let (s, e) = (SourceId::new("s1"), EntityId::new("m1"));
        let found = repo.find(&s, &e, 12.04).await.unwrap().unwrap();
        assert_eq!(found.page_number, 4);
        assert!(repo.find(&s, &e, 12.5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_updates_same_chapter() {
        let repo = setup_repo().await;
        repo.upsert(&HistoryEntry::new("s1", "m1", 3.0, t(0)))
            .await
            .unwrap();

        let mut progressed = HistoryEntry::new("s1", "m1", 3.0, t(10));
        progressed.page_number = 20;
        progressed.total_pages = 20;
        progressed.completed = true;
        repo.upsert(&progressed).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], progressed);
    }

    #[tokio::test]
    async fn test_set_canonical_and_delete_for_entity() {
        let repo = setup_repo().await;
        for chapter in [1.0, 2.0, 2.5] {
            repo.upsert(&HistoryEntry::new("s1", "m1", chapter, t(0)))
                .await
                .unwrap();
        }
        repo.upsert(&HistoryEntry::new("s1", "m2", 1.0, t(0)))
            .await
            .unwrap();

        let (s, e) = (SourceId::new("s1"), EntityId::new("m1"));
        assert_eq!(
            repo.set_canonical_id(&s, &e, &CanonicalId::new("c1"))
                .await
                .unwrap(),
            3
        );
        let entries = repo.list_for_entity(&s, &e).await.unwrap();
        assert!(entries
            .iter()
            .all(|h| h.canonical_id == Some(CanonicalId::new("c1"))));
        assert_eq!(entries[2].chapter_number, 2.5);

        assert_eq!(repo.delete_for_entity(&s, &e).await.unwrap(), 3);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
