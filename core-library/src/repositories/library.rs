//! Library item repository

use crate::error::{LibraryError, Result};
use crate::models::{CanonicalId, EntityId, LibraryItem, SourceId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Library item data access
#[async_trait]
pub trait LibraryItemRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<LibraryItem>>;

    async fn find(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<Option<LibraryItem>>;

    async fn find_by_canonical_id(&self, canonical_id: &CanonicalId) -> Result<Option<LibraryItem>>;

    /// Insert or overwrite the item keyed by `(source_id, entity_id)`.
    ///
    /// A `None` canonical id never clears one that is already stored.
    async fn upsert(&self, item: &LibraryItem) -> Result<()>;

    /// Record the resolved canonical id of an existing item.
    async fn set_canonical_id(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
        canonical_id: &CanonicalId,
    ) -> Result<()>;

    async fn delete(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool>;
}

pub struct SqliteLibraryItemRepository {
    pool: SqlitePool,
}

impl SqliteLibraryItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryItemRepository for SqliteLibraryItemRepository {
    async fn list(&self) -> Result<Vec<LibraryItem>> {
        let items = query_as::<_, LibraryItem>(
            "SELECT * FROM library_items ORDER BY source_id, entity_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn find(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<Option<LibraryItem>> {
        let item = query_as::<_, LibraryItem>(
            "SELECT * FROM library_items WHERE source_id = ? AND entity_id = ?",
        )
        .bind(source_id)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn find_by_canonical_id(&self, canonical_id: &CanonicalId) -> Result<Option<LibraryItem>> {
        let item = query_as::<_, LibraryItem>(
            "SELECT * FROM library_items WHERE canonical_id = ? LIMIT 1",
        )
        .bind(canonical_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn upsert(&self, item: &LibraryItem) -> Result<()> {
        item.validate().map_err(|e| LibraryError::InvalidInput {
            record: "LibraryItem".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO library_items (
                source_id, entity_id, canonical_id, date_added, last_opened, last_read, last_updated
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_id, entity_id) DO UPDATE SET
                canonical_id = COALESCE(excluded.canonical_id, library_items.canonical_id),
                date_added = excluded.date_added,
                last_opened = excluded.last_opened,
                last_read = excluded.last_read,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&item.source_id)
        .bind(&item.entity_id)
        .bind(&item.canonical_id)
        .bind(item.date_added)
        .bind(item.last_opened)
        .bind(item.last_read)
        .bind(item.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_canonical_id(
        &self,
        source_id: &SourceId,
        entity_id: &EntityId,
        canonical_id: &CanonicalId,
    ) -> Result<()> {
        let result = query(
            "UPDATE library_items SET canonical_id = ? WHERE source_id = ? AND entity_id = ?",
        )
        .bind(canonical_id)
        .bind(source_id)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                kind: "Library item".to_string(),
                key: format!("{}/{}", source_id, entity_id),
            });
        }

        Ok(())
    }

    async fn delete(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<bool> {
        let result = query("DELETE FROM library_items WHERE source_id = ? AND entity_id = ?")
            .bind(source_id)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
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

    async fn setup_repo() -> SqliteLibraryItemRepository {
        SqliteLibraryItemRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = setup_repo().await;
        let mut item = LibraryItem::new("s1", "m1", t(0));
        item.last_opened = Some(t(5));
        repo.upsert(&item).await.unwrap();

        let found = repo
            .find(&SourceId::new("s1"), &EntityId::new("m1"))
            .await
            .unwrap();
        assert_eq!(found, Some(item));
    }

    #[tokio::test]
    async fn test_upsert_never_clears_canonical_id() {
        let repo = setup_repo().await;
        repo.upsert(&LibraryItem::new("s1", "m1", t(0)).with_canonical_id("c1"))
            .await
            .unwrap();

        let mut newer = LibraryItem::new("s1", "m1", t(0));
        newer.last_read = Some(t(9));
        repo.upsert(&newer).await.unwrap();

        let found = repo
            .find_by_canonical_id(&CanonicalId::new("c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.last_read, Some(t(9)));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_canonical_id() {
        let repo = setup_repo().await;
        let (s, e) = (SourceId::new("s1"), EntityId::new("m1"));
        repo.upsert(&LibraryItem::new("s1", "m1", t(0))).await.unwrap();

        repo.set_canonical_id(&s, &e, &CanonicalId::new("c9"))
            .await
            .unwrap();
        let found = repo.find(&s, &e).await.unwrap().unwrap();
        assert_eq!(found.canonical_id, Some(CanonicalId::new("c9")));

        let missing = repo
            .set_canonical_id(&s, &EntityId::new("nope"), &CanonicalId::new("c9"))
            .await;
        assert!(matches!(missing, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup_repo().await;
        let (s, e) = (SourceId::new("s1"), EntityId::new("m1"));
        repo.upsert(&LibraryItem::new("s1", "m1", t(0))).await.unwrap();

        assert!(repo.delete(&s, &e).await.unwrap());
        assert!(repo.find(&s, &e).await.unwrap().is_none());
        assert!(!repo.delete(&s, &e).await.unwrap());
    }
}
