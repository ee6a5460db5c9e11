//! Record store trait definition
//!
//! Defines the interface a queue's durable record storage must implement.

use async_trait::async_trait;
use duraq_types::{MessageRecord, Result};

/// Durable storage of a queue's message records. One backing store per
/// service; one record set per queue name.
///
/// Callers are expected to validate queue names before handing them to a
/// store, and to serialize mutating access per queue — the store itself
/// provides no cross-call mutual exclusion.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append one record to the queue's record set, durably. Creates the
    /// queue on first use.
    async fn append(&self, queue: &str, record: &MessageRecord) -> Result<()>;

    /// Load every record of the queue in storage order. A queue that was
    /// never written to is empty, not an error.
    async fn load_all(&self, queue: &str) -> Result<Vec<MessageRecord>>;

    /// Atomically replace the queue's record set. A failed rewrite leaves
    /// the previous record set intact.
    async fn rewrite_all(&self, queue: &str, records: &[MessageRecord]) -> Result<()>;

    /// List the names of all queues that currently have a record set.
    async fn list_queues(&self) -> Result<Vec<String>>;

    /// Drop the queue's record set entirely. Removing a queue that does
    /// not exist is a no-op.
    async fn remove(&self, queue: &str) -> Result<()>;
}
