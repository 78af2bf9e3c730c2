use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the signed-in account on the remote service.
///
/// Every remote row is scoped by this id, and the sync lock is held per user.
///
/// # Examples
///
/// ```
/// use core_auth::UserId;
///
/// let user = UserId::new("8f0c6f2e-1f7b-4a53-a0a4-5d7f5d3f9b11");
/// assert_eq!(user.as_str(), "8f0c6f2e-1f7b-4a53-a0a4-5d7f5d3f9b11");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The account a session belongs to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl fmt::Debug for SessionUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionUser")
            .field("id", &self.id)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// An authenticated session issued by the remote service.
///
/// `expires_at` is fixed when the grant is received so that validity can be
/// checked against any [`Clock`](bridge_traits::time::Clock) later on.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds, as granted
    pub expires_in: i64,
    pub token_type: String,
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    /// Builds a session from a token grant received at `issued_at`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::{AuthSession, SessionUser};
    /// use chrono::{Duration, Utc};
    ///
    /// let now = Utc::now();
    /// let session = AuthSession::from_grant(
    ///     "access".to_string(),
    ///     "refresh".to_string(),
    ///     3600,
    ///     "bearer".to_string(),
    ///     SessionUser { id: "user-1".to_string(), email: None },
    ///     now,
    /// );
    ///
    /// assert!(session.is_valid(now));
    /// assert!(!session.is_valid(now + Duration::hours(2)));
    /// ```
    pub fn from_grant(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        token_type: String,
        user: SessionUser,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            token_type,
            user,
            expires_at: issued_at + Duration::seconds(expires_in),
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(self.user.id.clone())
    }

    /// The access token is still accepted at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// The access token expires within `buffer` of `now` and should be refreshed.
    pub fn expires_within(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now + buffer >= self.expires_at
    }
}

// Tokens must never reach logs.
impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
