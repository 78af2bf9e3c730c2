//! Error types for the Supabase provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_sync::SyncError;
use thiserror::Error;

/// Supabase provider errors
#[derive(Error, Debug)]
pub enum SupabaseError {
    /// No session to attach to the request
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The access token was rejected (401/403)
    #[error("Unauthorized (status {status_code}): {message}")]
    Unauthorized { status_code: u16, message: String },

    /// API request returned an error status
    #[error("Supabase API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Supabase operations
pub type Result<T> = std::result::Result<T, SupabaseError>;

impl SupabaseError {
    /// Classify a non-2xx response.
    pub fn from_status(status_code: u16, body: &[u8]) -> Self {
        let message = String::from_utf8_lossy(body).to_string();
        match status_code {
            401 | 403 => SupabaseError::Unauthorized {
                status_code,
                message,
            },
            _ => SupabaseError::ApiError {
                status_code,
                message,
            },
        }
    }

    /// Statuses worth another attempt.
    pub fn is_retryable_status(status_code: u16) -> bool {
        status_code == 429 || (500..600).contains(&status_code)
    }
}

impl From<SupabaseError> for SyncError {
    fn from(error: SupabaseError) -> Self {
        match error {
            SupabaseError::NotAuthenticated | SupabaseError::Unauthorized { .. } => {
                SyncError::AuthRequired
            }
            SupabaseError::ApiError {
                status_code,
                message,
            } if SupabaseError::is_retryable_status(status_code) => SyncError::RemoteUnavailable(
                format!("status {} after retries: {}", status_code, message),
            ),
            SupabaseError::ApiError {
                status_code,
                message,
            } => SyncError::InvalidResponse(format!("request rejected (status {}): {}", status_code, message)),
            SupabaseError::ParseError(msg) => SyncError::InvalidResponse(msg),
            SupabaseError::BridgeError(e) => SyncError::RemoteUnavailable(e.to_string()),
        }
    }
}

impl From<SupabaseError> for AuthError {
    fn from(error: SupabaseError) -> Self {
        match error {
            SupabaseError::NotAuthenticated => AuthError::NotAuthenticated,
            SupabaseError::Unauthorized { message, .. } => AuthError::AuthenticationFailed {
                provider: "supabase".to_string(),
                reason: message,
            },
            SupabaseError::ApiError {
                status_code,
                message,
            } => AuthError::AuthenticationFailed {
                provider: "supabase".to_string(),
                reason: format!("status {}: {}", status_code, message),
            },
            SupabaseError::ParseError(msg) => AuthError::InvalidResponse(msg),
            SupabaseError::BridgeError(e) => AuthError::AuthenticationFailed {
                provider: "supabase".to_string(),
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_credentials_require_auth() {
        let error = SupabaseError::from_status(401, b"JWT expired");
        assert!(matches!(error, SupabaseError::Unauthorized { status_code: 401, .. }));
        assert!(matches!(SyncError::from(error), SyncError::AuthRequired));
    }

    #[test]
    fn test_exhausted_retries_are_remote_unavailable() {
        let error = SupabaseError::from_status(503, b"");
        assert!(matches!(
            SyncError::from(error),
            SyncError::RemoteUnavailable(_)
        ));

        let error = SupabaseError::BridgeError(BridgeError::Timeout("30s".to_string()));
        assert!(matches!(
            SyncError::from(error),
            SyncError::RemoteUnavailable(_)
        ));
    }

    #[test]
    fn test_client_errors_are_item_level() {
        let error = SupabaseError::from_status(400, b"invalid input syntax");
        let sync_error = SyncError::from(error);
        assert!(matches!(sync_error, SyncError::InvalidResponse(_)));
        assert!(!sync_error.is_fatal());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(SupabaseError::is_retryable_status(429));
        assert!(SupabaseError::is_retryable_status(500));
        assert!(SupabaseError::is_retryable_status(503));
        assert!(!SupabaseError::is_retryable_status(404));
        assert!(!SupabaseError::is_retryable_status(401));
    }

    #[test]
    fn test_sign_in_rejection_maps_to_auth_failure() {
        let error = SupabaseError::from_status(400, b"Invalid login credentials");
        match AuthError::from(error) {
            AuthError::AuthenticationFailed { provider, reason } => {
                assert_eq!(provider, "supabase");
                assert!(reason.contains("Invalid login credentials"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
