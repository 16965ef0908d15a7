// Error handling module
// Defines the token cache error taxonomy

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while obtaining or caching an access token
#[derive(Error, Debug)]
pub enum AuthError {
    /// Persisted record is missing or corrupt.
    /// Recovered inside the store as a cache miss, never returned from `get_token`.
    #[error("Token cache unreadable: {0}")]
    CacheUnreadable(String),

    /// Login endpoint rejected the credential, was unreachable, or answered garbage
    #[error("Login failed: {0:#}")]
    LoginFailed(#[source] anyhow::Error),

    /// Token file could not be written
    #[error("Failed to persist token to {}: {source}", path.display())]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Startup configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for token operations
pub type Result<T> = std::result::Result<T, AuthError>;
