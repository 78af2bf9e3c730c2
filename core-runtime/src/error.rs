use thiserror::Error;

/// Errors raised while setting up the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing or out of range; the message says how to fix it.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging already initialized: {0}")]
    LoggingAlreadyInitialized(String),
}

pub type Result<T> = std::result::Result<T, Error>;
