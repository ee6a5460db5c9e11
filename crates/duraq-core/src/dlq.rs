//! Dead letter router
//!
//! Moves messages that have exhausted their receive budget out of the
//! source queue, into the configured dead-letter queue.

use std::sync::Arc;

use chrono::Utc;
use duraq_storage::RecordStore;
use duraq_types::{MessageRecord, Result};
use tracing::warn;

use crate::locks::QueueLocks;

/// Attribute key recording the receive count a message had accumulated
/// when it was dead-lettered. The record's own `receive_count` restarts
/// at zero in the dead-letter queue.
pub const PRIOR_RECEIVE_COUNT_ATTRIBUTE: &str = "duraq-prior-receive-count";

pub(crate) struct DeadLetterRouter {
    store: Arc<dyn RecordStore>,
    locks: Arc<QueueLocks>,
    destination: Option<String>,
}

impl DeadLetterRouter {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        locks: Arc<QueueLocks>,
        destination: Option<String>,
    ) -> Self {
        Self {
            store,
            locks,
            destination,
        }
    }

    /// Whether the given queue is the dead-letter destination itself.
    /// Records already in the destination are exempt from routing, so the
    /// queue cannot feed itself forever.
    pub(crate) fn is_destination(&self, queue: &str) -> bool {
        self.destination.as_deref() == Some(queue)
    }

    /// Move one exhausted message out of its source queue.
    ///
    /// With a destination configured, a reset copy (lease stripped,
    /// `receive_count` zeroed, exhausted count preserved in
    /// [`PRIOR_RECEIVE_COUNT_ATTRIBUTE`]) is durably appended there; an
    /// append failure propagates and the caller must leave the source
    /// record untouched. With no destination, the message is dropped with
    /// a warning rather than redelivered forever. The caller tombstones
    /// the source record only after this returns Ok.
    pub(crate) async fn route(&self, source_queue: &str, record: &MessageRecord) -> Result<()> {
        let Some(destination) = self.destination.as_deref() else {
            warn!(
                queue = %source_queue,
                message_id = %record.message_id,
                receive_count = record.receive_count,
                "Receive budget exhausted and no dead-letter queue configured; dropping message"
            );
            return Ok(());
        };

        let mut dead = record.clone();
        dead.attributes.insert(
            PRIOR_RECEIVE_COUNT_ATTRIBUTE.to_string(),
            record.receive_count.to_string(),
        );
        dead.receive_count = 0;
        dead.release_lease();
        dead.visible_at = Utc::now();
        dead.deleted = false;

        // Lock order is always source queue first, destination second;
        // the destination is exempt from routing, so the order cannot
        // invert and deadlock.
        let _guard = self.locks.acquire(destination).await;
        self.store.append(destination, &dead).await?;

        warn!(
            queue = %source_queue,
            dead_letter_queue = %destination,
            message_id = %record.message_id,
            receive_count = record.receive_count,
            "Message dead-lettered"
        );
        Ok(())
    }
}
