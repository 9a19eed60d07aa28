use thiserror::Error;

/// Errors callers need to tell apart. They travel inside `anyhow::Error`
/// and are recovered with `downcast_ref` where the distinction matters
/// (the HTTP layer maps them to status codes).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageBatchError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("{0}")]
    InvalidApiKey(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("No valid items to process")]
    NoValidItems,

    #[error("Invalid filename")]
    InvalidFilename,
}
