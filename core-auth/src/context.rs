//! # Auth Context
//!
//! The reconciliation engine only asks two things of authentication: is there
//! a valid session, and whose is it. [`AuthContext`] is that gate.
//!
//! [`SessionAuthContext`] is the injected implementation used by the
//! composition root. The host (or the sign-in client) hands it a session;
//! the engine reads it through the trait. There is no global session state.

use crate::types::{AuthSession, UserId};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Authentication gate consumed by the sync engine and remote providers.
#[async_trait]
pub trait AuthContext: Send + Sync {
    /// Whether a non-expired session is present.
    async fn is_valid(&self) -> bool;

    /// The signed-in user, if any. Returned even when the session expired.
    async fn user_id(&self) -> Option<UserId>;

    /// Bearer token for remote calls, only while the session is valid.
    async fn access_token(&self) -> Option<String>;
}

/// Holds the current [`AuthSession`] and answers [`AuthContext`] queries.
pub struct SessionAuthContext {
    session: RwLock<Option<AuthSession>>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl SessionAuthContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            session: RwLock::new(None),
            clock,
            event_bus: None,
        }
    }

    /// Emit [`AuthEvent`]s on session changes.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Installs a session.
    ///
    /// Replacing a session of the same user counts as a refresh; anything else
    /// is a sign-in.
    pub async fn set_session(&self, session: AuthSession) {
        let user_id = session.user.id.clone();
        let expires_at = session.expires_at.timestamp();

        let previous = {
            let mut guard = self.session.write().await;
            guard.replace(session)
        };

        let event = match previous {
            Some(prev) if prev.user.id == user_id => {
                debug!(user_id = %user_id, "Session refreshed");
                AuthEvent::SessionRefreshed {
                    user_id,
                    expires_at,
                }
            }
            _ => {
                info!(user_id = %user_id, "Session installed");
                AuthEvent::SignedIn { user_id }
            }
        };
        self.emit(event);
    }

    /// Drops the current session. Returns the session that was removed.
    pub async fn clear_session(&self) -> Option<AuthSession> {
        let previous = self.session.write().await.take();
        if let Some(session) = &previous {
            info!(user_id = %session.user.id, "Session cleared");
            self.emit(AuthEvent::SignedOut {
                user_id: session.user.id.clone(),
            });
        }
        previous
    }

    pub async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}

#[async_trait]
impl AuthContext for SessionAuthContext {
    async fn is_valid(&self) -> bool {
        let now = self.clock.now();
        self.session
            .read()
            .await
            .as_ref()
            .map_or(false, |session| session.is_valid(now))
    }

    async fn user_id(&self) -> Option<UserId> {
        self.session.read().await.as_ref().map(AuthSession::user_id)
    }

    async fn access_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.session
            .read()
            .await
            .as_ref()
            .filter(|session| session.is_valid(now))
            .map(|session| session.access_token.clone())
    }
}

impl std::fmt::Debug for SessionAuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthContext")
            .field("has_event_bus", &self.event_bus.is_some())
            .finish()
    }
}
