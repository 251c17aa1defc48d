use thiserror::Error;

use crate::embeddings::EmbeddingError;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A unique key is already taken, e.g. a registered email.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Errors raised on the search path. The search boundary turns all of these
/// into an apology response; the HTTP layer maps `InvalidArgument` to 400
/// before that.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Catalog unavailable: {0}")]
    Store(#[from] StorefrontError),

    #[error("Search timed out after {0}s")]
    Timeout(u64),
}
