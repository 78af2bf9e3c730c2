//! Supabase REST connector
//!
//! Implements [`RemoteService`] over PostgREST tables and RPCs.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use core_auth::{AuthContext, UserId};
use core_library::{CanonicalId, EntityId, HistoryEntry, LibraryItem, Source, SourceId};
use core_runtime::config::RemoteConfig;
use core_sync::RemoteService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SupabaseError};
use crate::types::{CanonicalMangaParams, HistoryRow, LibraryRow, SourceRow, UpsertLibraryParams};

const SOURCES_TABLE: &str = "scanio_user_sources";
const LIBRARY_TABLE: &str = "scanio_user_library";
const HISTORY_TABLE: &str = "scanio_reading_history";
const UPSERT_LIBRARY_RPC: &str = "rpc/scanio_upsert_user_library";
const CANONICAL_MANGA_RPC: &str = "rpc/scanio_get_or_create_canonical_manga";

/// Upserts merge on the table's conflict key and echo the stored row.
const PREFER_MERGE: &str = "resolution=merge-duplicates,return=representation";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `column=eq.value` filter with the value URL-encoded
fn eq(column: &str, value: &str) -> String {
    format!("{}=eq.{}", column, urlencoding::encode(value))
}

/// Supabase implementation of the sync engine's remote store.
///
/// Every request carries the project's anon key and the bearer token of the
/// current session. A request made without a valid session fails with
/// [`SupabaseError::NotAuthenticated`] before reaching the network.
///
/// # Example
///
/// ```ignore
/// use provider_supabase::SupabaseRemoteService;
///
/// let remote = SupabaseRemoteService::new(http_client, remote_config, auth_context);
/// let sources = remote.list_sources(&user_id).await?;
/// ```
pub struct SupabaseRemoteService {
    http_client: Arc<dyn HttpClient>,
    config: RemoteConfig,
    auth: Arc<dyn AuthContext>,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
}

impl SupabaseRemoteService {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        config: RemoteConfig,
        auth: Arc<dyn AuthContext>,
    ) -> Self {
        Self {
            http_client,
            config,
            auth,
            retry_policy: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, path)
    }

    async fn request(&self, method: HttpMethod, url: String) -> Result<HttpRequest> {
        let token = self
            .auth
            .access_token()
            .await
            .ok_or(SupabaseError::NotAuthenticated)?;

        Ok(HttpRequest::new(method, url)
            .header("apikey", self.config.api_key.clone())
            .header("Accept", "application/json")
            .bearer_token(token)
            .timeout(self.request_timeout))
    }

    fn with_json<T: Serialize>(request: HttpRequest, body: &T) -> Result<HttpRequest> {
        let json = serde_json::to_vec(body)
            .map_err(|e| SupabaseError::ParseError(format!("cannot encode request: {}", e)))?;
        Ok(request
            .header("Content-Type", "application/json")
            .body(Bytes::from(json)))
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| SupabaseError::ParseError(e.to_string()))
    }

    /// Execute a request, retrying rate limits, server errors and transient
    /// transport failures with exponential backoff.
    #[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.http_client.execute(request.clone()).await {
                Ok(response) => {
                    let status = response.status;

                    if response.is_success() {
                        debug!("API request succeeded: status={}", status);
                        return Ok(response);
                    } else if SupabaseError::is_retryable_status(status) {
                        if attempt >= max_attempts {
                            warn!(
                                "API request failed after {} attempts: status={}",
                                max_attempts, status
                            );
                            return Err(SupabaseError::from_status(status, &response.body));
                        }

                        let backoff = self.retry_policy.delay_for(attempt);
                        warn!(
                            "API request failed (attempt {}/{}): status={}, retrying in {}ms",
                            attempt,
                            max_attempts,
                            status,
                            backoff.as_millis()
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        warn!("API request failed: status={}", status);
                        return Err(SupabaseError::from_status(status, &response.body));
                    }
                }
                Err(e) => {
                    if !e.is_transient() || attempt >= max_attempts {
                        warn!("API request failed after {} attempts: {}", attempt, e);
                        return Err(e.into());
                    }

                    let backoff = self.retry_policy.delay_for(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt,
                        max_attempts,
                        e,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_rows<T: DeserializeOwned>(&self, path: String) -> Result<Vec<T>> {
        let request = self.request(HttpMethod::Get, self.rest_url(&path)).await?;
        let response = self.execute_with_retry(request).await?;
        Self::decode(&response)
    }

    async fn upsert_rows<B: Serialize, T: DeserializeOwned>(
        &self,
        path: String,
        body: &B,
    ) -> Result<Vec<T>> {
        let request = self.request(HttpMethod::Post, self.rest_url(&path)).await?;
        let request = Self::with_json(request.header("Prefer", PREFER_MERGE), body)?;
        let response = self.execute_with_retry(request).await?;
        Self::decode(&response)
    }

    async fn delete_rows(&self, path: String) -> Result<()> {
        let request = self.request(HttpMethod::Delete, self.rest_url(&path)).await?;
        self.execute_with_retry(request).await?;
        Ok(())
    }

    async fn call_rpc<B: Serialize>(&self, rpc: &str, body: &B) -> Result<HttpResponse> {
        let request = self.request(HttpMethod::Post, self.rest_url(rpc)).await?;
        let request = Self::with_json(request, body)?;
        self.execute_with_retry(request).await
    }
}

#[async_trait]
impl RemoteService for SupabaseRemoteService {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_sources(&self, user_id: &UserId) -> core_sync::Result<Vec<Source>> {
        let path = format!(
            "{}?{}&order=added_at.desc",
            SOURCES_TABLE,
            eq("user_id", user_id.as_str())
        );
        let rows: Vec<SourceRow> = self.get_rows(path).await?;
        info!(count = rows.len(), "Fetched remote sources");
        Ok(rows.into_iter().map(SourceRow::into_source).collect())
    }

    #[instrument(skip(self, source), fields(user_id = %user_id, source_id = %source.source_id))]
    async fn upsert_source(&self, user_id: &UserId, source: &Source) -> core_sync::Result<Source> {
        let path = format!("{}?on_conflict=user_id,source_id", SOURCES_TABLE);
        let row = SourceRow::from_source(user_id, source);
        let stored: Vec<SourceRow> = self.upsert_rows(path, &row).await?;

        Ok(stored
            .into_iter()
            .next()
            .map(SourceRow::into_source)
            .unwrap_or_else(|| source.clone()))
    }

    #[instrument(skip(self), fields(user_id = %user_id, source_id = %source_id))]
    async fn delete_source(&self, user_id: &UserId, source_id: &SourceId) -> core_sync::Result<()> {
        let path = format!(
            "{}?{}&{}",
            SOURCES_TABLE,
            eq("user_id", user_id.as_str()),
            eq("source_id", source_id.as_str())
        );
        Ok(self.delete_rows(path).await?)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_library(&self, user_id: &UserId) -> core_sync::Result<Vec<LibraryItem>> {
        let path = format!("{}?{}", LIBRARY_TABLE, eq("user_id", user_id.as_str()));
        let rows: Vec<LibraryRow> = self.get_rows(path).await?;
        info!(count = rows.len(), "Fetched remote library");
        Ok(rows.into_iter().map(LibraryRow::into_item).collect())
    }

    /// The upsert RPC returns no row, so the stored item is the one sent.
    #[instrument(skip(self, item), fields(user_id = %user_id, entity_id = %item.entity_id))]
    async fn upsert_library_item(
        &self,
        user_id: &UserId,
        item: &LibraryItem,
    ) -> core_sync::Result<LibraryItem> {
        let params = UpsertLibraryParams::from_item(user_id, item)?;
        self.call_rpc(UPSERT_LIBRARY_RPC, &params).await?;
        Ok(item.clone())
    }

    #[instrument(skip(self), fields(user_id = %user_id, canonical_id = %canonical_id))]
    async fn delete_library_item(
        &self,
        user_id: &UserId,
        canonical_id: &CanonicalId,
    ) -> core_sync::Result<()> {
        let path = format!(
            "{}?{}&{}",
            LIBRARY_TABLE,
            eq("user_id", user_id.as_str()),
            eq("canonical_manga_id", canonical_id.as_str())
        );
        Ok(self.delete_rows(path).await?)
    }

    /// Rows that cannot be decoded into an entry are skipped.
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_history(&self, user_id: &UserId) -> core_sync::Result<Vec<HistoryEntry>> {
        let path = format!("{}?{}", HISTORY_TABLE, eq("user_id", user_id.as_str()));
        let rows: Vec<HistoryRow> = self.get_rows(path).await?;
        let total = rows.len();

        let entries: Vec<HistoryEntry> = rows
            .into_iter()
            .filter_map(|row| match row.into_entry() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed history row");
                    None
                }
            })
            .collect();

        info!(count = entries.len(), skipped = total - entries.len(), "Fetched remote history");
        Ok(entries)
    }

    #[instrument(skip(self, entry), fields(user_id = %user_id, entity_id = %entry.entity_id, chapter = entry.chapter_number))]
    async fn upsert_history(
        &self,
        user_id: &UserId,
        entry: &HistoryEntry,
    ) -> core_sync::Result<HistoryEntry> {
        let path = format!(
            "{}?on_conflict=user_id,canonical_manga_id,chapter_number",
            HISTORY_TABLE
        );
        let row = HistoryRow::from_entry(user_id, entry)?;
        let stored: Vec<HistoryRow> = self.upsert_rows(path, &row).await?;

        match stored.into_iter().next() {
            Some(row) => Ok(row.into_entry()?),
            None => Ok(entry.clone()),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id, source_id = %source_id, entity_id = %entity_id))]
    async fn delete_history(
        &self,
        user_id: &UserId,
        source_id: &SourceId,
        entity_id: &EntityId,
        chapter_number: Option<f64>,
    ) -> core_sync::Result<()> {
        let mut path = format!(
            "{}?{}&{}&{}",
            HISTORY_TABLE,
            eq("user_id", user_id.as_str()),
            eq("source_id", source_id.as_str()),
            eq("manga_id", entity_id.as_str())
        );
        if let Some(chapter_number) = chapter_number {
            path.push('&');
            path.push_str(&eq("chapter_number", &format!("{:.1}", chapter_number)));
        }
        Ok(self.delete_rows(path).await?)
    }

    #[instrument(skip(self, title), fields(source_id = %source_id, entity_id = %entity_id))]
    async fn resolve_canonical_id(
        &self,
        title: &str,
        source_id: &SourceId,
        entity_id: &EntityId,
    ) -> core_sync::Result<CanonicalId> {
        let params = CanonicalMangaParams {
            p_title: title.to_string(),
            p_source_id: source_id.to_string(),
            p_manga_id: entity_id.to_string(),
        };
        let response = self.call_rpc(CANONICAL_MANGA_RPC, &params).await?;

        let text = response.text().map_err(SupabaseError::from)?;
        let canonical_id = text.trim().trim_matches('"');
        if canonical_id.is_empty() || canonical_id == "null" {
            return Err(SupabaseError::ParseError(format!(
                "empty canonical id for {}/{}",
                source_id, entity_id
            ))
            .into());
        }

        debug!(canonical_id, "Resolved canonical id");
        Ok(CanonicalId::new(canonical_id))
    }
}

impl std::fmt::Debug for SupabaseRemoteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseRemoteService")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use chrono::{TimeZone, Utc};
    use core_sync::SyncError;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    struct StaticAuth {
        token: Option<String>,
    }

    #[async_trait]
    impl AuthContext for StaticAuth {
        async fn is_valid(&self) -> bool {
            self.token.is_some()
        }

        async fn user_id(&self) -> Option<UserId> {
            Some(UserId::new("u1"))
        }

        async fn access_token(&self) -> Option<String> {
            self.token.clone()
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn service(http_client: MockHttpClient) -> SupabaseRemoteService {
        SupabaseRemoteService::new(
            Arc::new(http_client),
            RemoteConfig::new("https://project.supabase.co/", "anon-key"),
            Arc::new(StaticAuth {
                token: Some("jwt".to_string()),
            }),
        )
        .with_retry_policy(RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        })
    }

    #[tokio::test]
    async fn test_requests_carry_api_key_and_bearer_token() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Get
                    && request.url
                        == "https://project.supabase.co/rest/v1/scanio_user_sources?user_id=eq.u1&order=added_at.desc"
                    && request.headers.get("apikey") == Some(&"anon-key".to_string())
                    && request.headers.get("Authorization") == Some(&"Bearer jwt".to_string())
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"[{"id":"1","user_id":"u1","source_id":"en.example","source_name":"Example","source_lang":"en","source_url":"https://repo.example/index.json","added_at":"2024-01-01T00:00:00Z"}]"#,
                ))
            });

        let sources = service(http_client)
            .list_sources(&UserId::new("u1"))
            .await
            .unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Example");
        assert_eq!(
            sources[0].origin_url.as_deref(),
            Some("https://repo.example/index.json")
        );
    }

    #[tokio::test]
    async fn test_missing_session_never_reaches_network() {
        let mut http_client = MockHttpClient::new();
        http_client.expect_execute().times(0);

        let remote = SupabaseRemoteService::new(
            Arc::new(http_client),
            RemoteConfig::new("https://project.supabase.co", "anon-key"),
            Arc::new(StaticAuth { token: None }),
        );

        let result = remote.list_library(&UserId::new("u1")).await;
        assert!(matches!(result, Err(SyncError::AuthRequired)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut http_client = MockHttpClient::new();
        http_client.expect_execute().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(response(503, "unavailable"))
            } else {
                Ok(response(200, "[]"))
            }
        });

        let history = service(http_client)
            .list_history(&UserId::new("u1"))
            .await
            .unwrap();

        assert!(history.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_remote_unavailable() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .times(3)
            .returning(|_| Ok(response(429, "slow down")));

        let result = service(http_client).list_library(&UserId::new("u1")).await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut http_client = MockHttpClient::new();
        http_client.expect_execute().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BridgeError::Timeout("connect".to_string()))
            } else {
                Ok(response(200, "[]"))
            }
        });

        let sources = service(http_client)
            .list_sources(&UserId::new("u1"))
            .await
            .unwrap();
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, "JWT expired")));

        let result = service(http_client).list_sources(&UserId::new("u1")).await;
        assert!(matches!(result, Err(SyncError::AuthRequired)));
    }

    #[tokio::test]
    async fn test_resolve_canonical_id_trims_quoted_string() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .withf(|request| {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                request.url.ends_with("/rest/v1/rpc/scanio_get_or_create_canonical_manga")
                    && body["p_title"] == "One Piece"
                    && body["p_source_id"] == "s1"
                    && body["p_manga_id"] == "m1"
            })
            .times(1)
            .returning(|_| Ok(response(200, "\"5b1f0c1e-canonical\"\n")));

        let canonical_id = service(http_client)
            .resolve_canonical_id("One Piece", &SourceId::new("s1"), &EntityId::new("m1"))
            .await
            .unwrap();

        assert_eq!(canonical_id.as_str(), "5b1f0c1e-canonical");
    }

    #[tokio::test]
    async fn test_resolve_canonical_id_rejects_null() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .returning(|_| Ok(response(200, "null")));

        let result = service(http_client)
            .resolve_canonical_id("X", &SourceId::new("s1"), &EntityId::new("m1"))
            .await;
        assert!(matches!(result, Err(SyncError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_history_upsert_merges_on_conflict_key() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .withf(|request| {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                request.url.ends_with(
                    "/scanio_reading_history?on_conflict=user_id,canonical_manga_id,chapter_number",
                ) && request.headers.get("Prefer")
                    == Some(&"resolution=merge-duplicates,return=representation".to_string())
                    && body["chapter_number"] == "12.5"
            })
            .times(1)
            .returning(|request| {
                let mut row: serde_json::Value =
                    serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                row["id"] = serde_json::Value::String("row-1".to_string());
                Ok(response(200, &format!("[{}]", row)))
            });

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut entry = HistoryEntry::new("s1", "m1", 12.5, at);
        entry.canonical_id = Some("c1".into());
        entry.page_number = 9;
        entry.total_pages = 30;

        let stored = service(http_client)
            .upsert_history(&UserId::new("u1"), &entry)
            .await
            .unwrap();

        assert_eq!(stored.chapter_number, 12.5);
        assert_eq!(stored.page_number, 9);
        assert_eq!(stored.last_read_at, at);
    }

    #[tokio::test]
    async fn test_library_upsert_goes_through_rpc() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url.ends_with("/rest/v1/rpc/scanio_upsert_user_library")
            })
            .times(1)
            .returning(|_| Ok(response(204, "")));

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let item = LibraryItem::new("s1", "m1", at).with_canonical_id("c1");

        let stored = service(http_client)
            .upsert_library_item(&UserId::new("u1"), &item)
            .await
            .unwrap();
        assert_eq!(stored, item);
    }

    #[tokio::test]
    async fn test_delete_single_chapter_filters_by_chapter_number() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Delete
                    && request.url.ends_with(
                        "scanio_reading_history?user_id=eq.u1&source_id=eq.en.example&manga_id=eq.a%20b&chapter_number=eq.3.0",
                    )
            })
            .times(1)
            .returning(|_| Ok(response(204, "")));

        service(http_client)
            .delete_history(
                &UserId::new("u1"),
                &SourceId::new("en.example"),
                &EntityId::new("a b"),
                Some(3.0),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_history_rows_are_skipped() {
        let mut http_client = MockHttpClient::new();
        http_client.expect_execute().returning(|_| {
            Ok(response(
                200,
                r#"[
                    {"user_id":"u1","canonical_manga_id":"c1","source_id":"s1","manga_id":"m1","chapter_number":"1.0","last_read_at":"2024-01-01T00:00:00Z"},
                    {"user_id":"u1","canonical_manga_id":"c1","source_id":"s1","manga_id":"m1","chapter_number":"oneshot","last_read_at":"2024-01-01T00:00:00Z"},
                    {"user_id":"u1","canonical_manga_id":"c1","source_id":"s1","manga_id":"m1","chapter_number":"NaN","last_read_at":"2024-01-01T00:00:00Z"}
                ]"#,
            ))
        });

        let history = service(http_client)
            .list_history(&UserId::new("u1"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].chapter_number, 1.0);
    }
}
