//! Error types for duraq
//!
//! Defines all error types used throughout the queue.

use std::path::Path;

use thiserror::Error;

/// Main error type for duraq operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid message or queue name. Never retried;
    /// the caller must fix its input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Receipt handle does not correspond to any in-flight lease
    /// (already acked, or never issued).
    #[error("unknown receipt handle: {0}")]
    UnknownHandle(String),

    /// Receipt handle's lease has already expired. The message has
    /// returned to the pool; callers should treat this as benign.
    #[error("expired receipt handle: {0}")]
    ExpiredHandle(String),

    /// Underlying file read/write/rename failed. Not retried by the
    /// queue itself; callers may retry at their discretion.
    #[error("i/o failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A queue file line could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an i/o error with the path it occurred on.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type alias for duraq operations
pub type Result<T> = std::result::Result<T, Error>;
