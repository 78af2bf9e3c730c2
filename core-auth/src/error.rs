use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Provider {provider} authentication failed: {reason}")]
    AuthenticationFailed { provider: String, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Session expired at {expires_at}")]
    SessionExpired {
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, AuthError>;
