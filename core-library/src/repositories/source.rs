//! Installed source repository

use crate::error::{LibraryError, Result};
use crate::models::{Source, SourceId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Installed source data access
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Source>>;

    async fn find(&self, source_id: &SourceId) -> Result<Option<Source>>;

    /// Insert the source, or overwrite name, language and origin if present.
    async fn upsert(&self, source: &Source) -> Result<()>;

    /// Whether the source is installed on this device.
    async fn exists(&self, source_id: &SourceId) -> Result<bool>;

    /// Returns `false` if nothing was deleted.
    async fn delete(&self, source_id: &SourceId) -> Result<bool>;
}

pub struct SqliteSourceRepository {
    pool: SqlitePool,
}

impl SqliteSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceRepository for SqliteSourceRepository {
    async fn list(&self) -> Result<Vec<Source>> {
        let sources = query_as::<_, Source>("SELECT * FROM sources ORDER BY source_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    async fn find(&self, source_id: &SourceId) -> Result<Option<Source>> {
        let source = query_as::<_, Source>("SELECT * FROM sources WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    async fn upsert(&self, source: &Source) -> Result<()> {
        source.validate().map_err(|e| LibraryError::InvalidInput {
            record: "Source".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO sources (source_id, name, lang, origin_url)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (source_id) DO UPDATE SET
                name = excluded.name,
                lang = excluded.lang,
                origin_url = excluded.origin_url
            "#,
        )
        .bind(&source.source_id)
        .bind(&source.name)
        .bind(&source.lang)
        .bind(&source.origin_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, source_id: &SourceId) -> Result<bool> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM sources WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn delete(&self, source_id: &SourceId) -> Result<bool> {
        let result = query("DELETE FROM sources WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup_repo() -> SqliteSourceRepository {
        SqliteSourceRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = setup_repo().await;
        let source = Source::new("en.example", "Example", "en");
        repo.upsert(&source).await.unwrap();

        let found = repo.find(&SourceId::new("en.example")).await.unwrap();
        assert_eq!(found, Some(source));
        assert!(repo.exists(&SourceId::new("en.example")).await.unwrap());
        assert!(!repo.exists(&SourceId::new("en.other")).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let repo = setup_repo().await;
        repo.upsert(&Source::new("en.example", "Example", "en"))
            .await
            .unwrap();
        repo.upsert(
            &Source::new("en.example", "Example v2", "en").with_origin_url("https://repo.example"),
        )
        .await
        .unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Example v2");
        assert_eq!(all[0].origin_url.as_deref(), Some("https://repo.example"));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup_repo().await;
        repo.upsert(&Source::new("en.example", "Example", "en"))
            .await
            .unwrap();

        assert!(repo.delete(&SourceId::new("en.example")).await.unwrap());
        assert!(!repo.delete(&SourceId::new("en.example")).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_source() {
        let repo = setup_repo().await;
        let result = repo.upsert(&Source::new("en.example", "", "en")).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }
}
