use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No valid session, or the remote rejected the credentials.
    #[error("Authentication required")]
    AuthRequired,

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Source {source_id} is not installed")]
    SourceNotInstalled { source_id: String },

    #[error("Could not resolve canonical identity for {source_id}/{entity_id}: {reason}")]
    IdentityResolutionFailed {
        source_id: String,
        entity_id: String,
        reason: String,
    },

    #[error("Content provider error: {0}")]
    ContentProviderError(String),

    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),

    #[error("Sync already in progress for user {user_id}")]
    SyncInProgress { user_id: String },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Local store error: {0}")]
    Library(#[from] LibraryError),
}

impl SyncError {
    /// Errors that end the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::AuthRequired)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(SyncError::AuthRequired.is_fatal());
        assert!(!SyncError::RemoteUnavailable("503".to_string()).is_fatal());
        assert!(!SyncError::SourceNotInstalled {
            source_id: "s".to_string()
        }
        .is_fatal());
        assert!(!SyncError::Cancelled.is_fatal());
    }
}
