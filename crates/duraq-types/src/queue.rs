//! Queue types for duraq
//!
//! Defines the queue service configuration and derived queue attributes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Queue service configuration. One configuration governs every queue
/// file under `base_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Root directory for queue files
    pub base_dir: PathBuf,

    /// Lease grants a message may consume before it is routed to the
    /// dead-letter destination
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Visibility timeout applied when `receive` does not override it
    #[serde(default = "default_visibility_timeout_ms")]
    pub default_visibility_timeout_ms: u64,

    /// Dead-letter destination queue (optional). When unset, messages
    /// that exhaust their receive budget are dropped with a warning.
    pub dead_letter_queue: Option<String>,

    /// Base delay for the exponential nack backoff
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Ceiling for the nack backoff delay
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,

    /// Maximum accepted message body size in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_visibility_timeout_ms() -> u64 {
    30_000
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_max_retry_backoff_ms() -> u64 {
    60_000
}

fn default_max_message_bytes() -> usize {
    262_144 // 256 KiB
}

impl QueueConfig {
    /// Create a configuration with defaults rooted at the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_receive_count: default_max_receive_count(),
            default_visibility_timeout_ms: default_visibility_timeout_ms(),
            dead_letter_queue: None,
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            max_message_bytes: default_max_message_bytes(),
        }
    }

    /// Set the dead-letter destination queue
    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter_queue = Some(queue.into());
        self
    }

    /// Set the receive budget before dead-lettering
    pub fn with_max_receive_count(mut self, max: u32) -> Self {
        self.max_receive_count = max;
        self
    }

    /// Set the default visibility timeout
    pub fn with_default_visibility_timeout_ms(mut self, ms: u64) -> Self {
        self.default_visibility_timeout_ms = ms;
        self
    }

    /// Set the nack backoff base delay
    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }
}

/// Derived, read-only queue summary. Approximate because it is computed
/// at call time from a possibly-changing file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueAttributes {
    /// Messages currently deliverable
    pub approximate_visible_count: u64,

    /// Messages leased and not yet acked, nacked, or expired
    pub approximate_in_flight_count: u64,
}

/// Maximum accepted queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 80;

/// Validate a queue name. Names become file path components, so only
/// ASCII alphanumerics, `-`, and `_` are accepted.
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("queue name must not be empty".into()));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(Error::Validation(format!(
            "queue name exceeds {MAX_QUEUE_NAME_LEN} characters: {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Validation(format!(
            "queue name may only contain ASCII alphanumerics, '-', and '_': {name}"
        )));
    }
    Ok(())
}
