//! Supabase GoTrue authentication
//!
//! Password sign-in and refresh-token grants. Both return an [`AuthSession`]
//! whose expiry is fixed against the injected [`Clock`].

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::Duration;
use core_auth::{AuthContext, AuthError, AuthSession, SessionAuthContext};
use core_runtime::config::RemoteConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::SupabaseError;
use crate::types::{PasswordGrant, RefreshGrant, TokenResponse};

const AUTH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct SupabaseAuthClient {
    http_client: Arc<dyn HttpClient>,
    config: RemoteConfig,
    clock: Arc<dyn Clock>,
}

impl SupabaseAuthClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: RemoteConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            http_client,
            config,
            clock,
        }
    }

    /// Exchange email and password for a session.
    ///
    /// # Errors
    ///
    /// [`AuthError::AuthenticationFailed`] when the credentials are rejected or
    /// the service is unreachable.
    #[instrument(skip(self, email, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> core_auth::Result<AuthSession> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password })
            .await
            .map_err(AuthError::from)?;

        info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new session.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_session(&self, refresh_token: &str) -> core_auth::Result<AuthSession> {
        let session = self
            .token_grant("refresh_token", &RefreshGrant { refresh_token })
            .await
            .map_err(|e| match e {
                SupabaseError::ParseError(msg) => AuthError::InvalidResponse(msg),
                other => AuthError::TokenRefreshFailed(other.to_string()),
            })?;

        debug!(user_id = %session.user.id, "Session refreshed");
        Ok(session)
    }

    /// Refresh the session held by `context` when it expires within `buffer`.
    ///
    /// Returns `true` if a new session was installed.
    pub async fn refresh_if_expiring(
        &self,
        context: &SessionAuthContext,
        buffer: Duration,
    ) -> core_auth::Result<bool> {
        let Some(session) = context.current_session().await else {
            return Err(AuthError::NotAuthenticated);
        };
        if !session.expires_within(self.clock.now(), buffer) {
            return Ok(false);
        }

        match self.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => {
                context.set_session(refreshed).await;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, still_valid = context.is_valid().await, "Session refresh failed");
                Err(e)
            }
        }
    }

    async fn token_grant<B: Serialize>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<AuthSession, SupabaseError> {
        let url = format!(
            "{}/auth/v1/token?grant_type={}",
            self.config.base_url, grant_type
        );
        let json = serde_json::to_vec(body)
            .map_err(|e| SupabaseError::ParseError(format!("cannot encode grant: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("apikey", self.config.api_key.clone())
            .header("Content-Type", "application/json")
            .body(Bytes::from(json))
            .timeout(AUTH_TIMEOUT);

        let issued_at = self.clock.now();
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(SupabaseError::from_status(response.status, &response.body));
        }

        let grant: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| SupabaseError::ParseError(format!("invalid token response: {}", e)))?;

        Ok(AuthSession::from_grant(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            grant.token_type,
            grant.user,
            issued_at,
        ))
    }
}

impl std::fmt::Debug for SupabaseAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
