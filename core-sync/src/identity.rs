//! # Identity Resolution
//!
//! Maps `(source_id, entity_id, title)` to the [`CanonicalId`] shared by all
//! devices. The remote resolve-or-create call is idempotent; the resolver adds
//! a cache that lives for one sync run so the library and history phases do
//! not resolve the same item twice.

use crate::error::{Result, SyncError};
use crate::remote::RemoteService;
use core_auth::AuthContext;
use core_library::{CanonicalId, EntityId, SourceId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

type ItemRef = (SourceId, EntityId);

pub struct IdentityResolver {
    remote: Arc<dyn RemoteService>,
    auth: Arc<dyn AuthContext>,
    timeout: Duration,
    cache: Mutex<HashMap<ItemRef, CanonicalId>>,
}

impl IdentityResolver {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        auth: Arc<dyn AuthContext>,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            auth,
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the canonical id of an item.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AuthRequired`] without a valid session
    /// - [`SyncError::RemoteUnavailable`] on transport failure or timeout
    #[instrument(skip(self, title), fields(source_id = %source_id, entity_id = %entity_id))]
    pub async fn resolve(
        &self,
        title: &str,
        source_id: &SourceId,
        entity_id: &EntityId,
    ) -> Result<CanonicalId> {
        if let Some(hit) = self.cached(source_id, entity_id).await {
            debug!(canonical_id = %hit, "Canonical id cache hit");
            return Ok(hit);
        }

        if !self.auth.is_valid().await {
            return Err(SyncError::AuthRequired);
        }

        let call = self.remote.resolve_canonical_id(title, source_id, entity_id);
        let canonical_id = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SyncError::RemoteUnavailable(format!(
                    "canonical id resolution timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        debug!(canonical_id = %canonical_id, "Resolved canonical id");
        self.remember(source_id, entity_id, canonical_id.clone()).await;
        Ok(canonical_id)
    }

    pub async fn cached(&self, source_id: &SourceId, entity_id: &EntityId) -> Option<CanonicalId> {
        self.cache
            .lock()
            .await
            .get(&(source_id.clone(), entity_id.clone()))
            .cloned()
    }

    /// Record an identity already known locally.
    pub async fn remember(&self, source_id: &SourceId, entity_id: &EntityId, canonical_id: CanonicalId) {
        self.cache
            .lock()
            .await
            .insert((source_id.clone(), entity_id.clone()), canonical_id);
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
