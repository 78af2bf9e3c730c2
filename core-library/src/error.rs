use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An update addressed a row that does not exist
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    /// A record failed validation before reaching the store
    #[error("Invalid {record}: {message}")]
    InvalidInput { record: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
