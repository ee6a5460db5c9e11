//! LocalQueue - the public queue operation surface
//!
//! Composes the record store, visibility/lease scanning, receipt-handle
//! resolution, and dead-letter routing behind send / receive / ack /
//! nack / get_attributes.

use std::sync::Arc;

use chrono::Utc;
use duraq_storage::{NdjsonStore, RecordStore};
use duraq_types::{
    validate_queue_name, Error, MessageId, MessageRecord, QueueAttributes, QueueConfig,
    ReceiptHandle, ReceiveOptions, ReceivedMessage, Result, SendOptions,
};
use tracing::{debug, info};

use crate::dlq::DeadLetterRouter;
use crate::locks::QueueLocks;
use crate::{manager, tracker};

/// Local durable queue service. One instance owns every queue file under
/// its configured base directory.
///
/// All mutating operations serialize on a per-queue async lock, so
/// concurrent calls within the process cannot lose updates. Mutating the
/// same queue directory from more than one process is out of contract.
pub struct LocalQueue {
    config: QueueConfig,
    store: Arc<dyn RecordStore>,
    locks: Arc<QueueLocks>,
    router: DeadLetterRouter,
}

impl LocalQueue {
    /// Create a queue service over NDJSON files rooted at the configured
    /// base directory.
    pub fn new(config: QueueConfig) -> Self {
        let store: Arc<dyn RecordStore> = Arc::new(NdjsonStore::new(&config.base_dir));
        Self::with_store(store, config)
    }

    /// Create a queue service over a caller-supplied record store.
    pub fn with_store(store: Arc<dyn RecordStore>, config: QueueConfig) -> Self {
        info!(
            base_dir = %config.base_dir.display(),
            dead_letter_queue = config.dead_letter_queue.as_deref().unwrap_or("<none>"),
            "Initializing local queue service"
        );
        let locks = Arc::new(QueueLocks::new());
        let router = DeadLetterRouter::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            config.dead_letter_queue.clone(),
        );
        Self {
            config,
            store,
            locks,
            router,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// The underlying record store
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    // ==================== Producer Operations ====================

    /// Append a message to the queue, durably, and return its id. The
    /// queue springs into existence on first send.
    pub async fn send(
        &self,
        queue: &str,
        body: impl Into<String>,
        options: SendOptions,
    ) -> Result<MessageId> {
        validate_queue_name(queue)?;
        let body = body.into();
        if body.len() > self.config.max_message_bytes {
            return Err(Error::Validation(format!(
                "message body of {} bytes exceeds the {}-byte limit",
                body.len(),
                self.config.max_message_bytes
            )));
        }
        if options.attributes.keys().any(|key| key.trim().is_empty()) {
            return Err(Error::Validation(
                "attribute keys must not be empty".to_string(),
            ));
        }

        let mut record = MessageRecord::new(body);
        record.attributes = options.attributes;
        if let Some(delay_seconds) = options.delay_seconds {
            record = record.with_delay_seconds(delay_seconds);
        }
        let message_id = record.message_id.clone();

        let _guard = self.locks.acquire(queue).await;
        self.store.append(queue, &record).await?;

        debug!(
            queue = %queue,
            message_id = %message_id,
            delayed = options.delay_seconds.is_some(),
            "Message sent"
        );
        Ok(message_id)
    }

    // ==================== Consumer Operations ====================

    /// Lease up to `max_messages` visible messages, oldest first. Each
    /// leased message is hidden from other receives until its visibility
    /// timeout passes or it is nacked. An empty result is a normal
    /// outcome. Messages that have exhausted their receive budget are
    /// routed to the dead-letter queue instead of being returned.
    pub async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>> {
        validate_queue_name(queue)?;
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let timeout_ms = options
            .visibility_timeout_ms
            .unwrap_or(self.config.default_visibility_timeout_ms);

        let _guard = self.locks.acquire(queue).await;
        let mut records = self.store.load_all(queue).await?;
        let now = Utc::now();

        // Records in the dead-letter destination are never routed again.
        let exempt = self.router.is_destination(queue);

        let mut delivered = Vec::new();
        let mut mutated = false;
        for idx in manager::visible_indices(&records, now) {
            if delivered.len() >= max_messages {
                break;
            }
            if !exempt && records[idx].receive_count >= self.config.max_receive_count {
                // Route before tombstoning: a failed dead-letter append
                // propagates and leaves the source record untouched.
                self.router.route(queue, &records[idx]).await?;
                records[idx].deleted = true;
                mutated = true;
                continue;
            }

            let handle = manager::grant_lease(&mut records[idx], timeout_ms, now);
            mutated = true;
            delivered.push(ReceivedMessage {
                id: records[idx].message_id.clone(),
                body: records[idx].body.clone(),
                attributes: records[idx].attributes.clone(),
                receipt_handle: handle,
                receive_count: records[idx].receive_count,
            });
        }

        if mutated {
            self.store.rewrite_all(queue, &records).await?;
        }

        debug!(
            queue = %queue,
            delivered = delivered.len(),
            "Receive scan complete"
        );
        Ok(delivered)
    }

    /// Acknowledge a delivery: the message is permanently removed.
    /// Fails with `UnknownHandle` if the handle was never issued or was
    /// already acked, and `ExpiredHandle` if its lease has lapsed.
    pub async fn delete(&self, queue: &str, handle: &ReceiptHandle) -> Result<()> {
        validate_queue_name(queue)?;
        let _guard = self.locks.acquire(queue).await;
        let mut records = self.store.load_all(queue).await?;

        let record = tracker::resolve(&mut records, handle, Utc::now())?;
        record.deleted = true;
        let message_id = record.message_id.clone();

        self.store.rewrite_all(queue, &records).await?;
        debug!(queue = %queue, message_id = %message_id, "Message acknowledged");
        Ok(())
    }

    /// Alias of [`delete`](Self::delete).
    pub async fn ack(&self, queue: &str, handle: &ReceiptHandle) -> Result<()> {
        self.delete(queue, handle).await
    }

    /// Give up a delivery without acknowledging it. With `retry` the
    /// message becomes deliverable immediately; without it, redelivery is
    /// pushed out by an exponential backoff keyed on the delivery count.
    pub async fn nack(&self, queue: &str, handle: &ReceiptHandle, retry: bool) -> Result<()> {
        validate_queue_name(queue)?;
        let _guard = self.locks.acquire(queue).await;
        let mut records = self.store.load_all(queue).await?;
        let now = Utc::now();

        let record = tracker::resolve(&mut records, handle, now)?;
        record.release_lease();
        record.visible_at = if retry {
            now
        } else {
            now + manager::retry_backoff(&self.config, record.receive_count)
        };
        let message_id = record.message_id.clone();
        let visible_at = record.visible_at;

        self.store.rewrite_all(queue, &records).await?;
        debug!(
            queue = %queue,
            message_id = %message_id,
            retry = retry,
            visible_at = %visible_at,
            "Message nacked"
        );
        Ok(())
    }

    // ==================== Inspection ====================

    /// Approximate visible and in-flight counts, computed at call time
    /// from the current record set. A queue with no backing file reports
    /// zeros.
    pub async fn get_attributes(&self, queue: &str) -> Result<QueueAttributes> {
        validate_queue_name(queue)?;
        let records = self.store.load_all(queue).await?;
        let now = Utc::now();

        Ok(QueueAttributes {
            approximate_visible_count: records.iter().filter(|r| r.is_visible(now)).count() as u64,
            approximate_in_flight_count: records.iter().filter(|r| r.is_in_flight(now)).count()
                as u64,
        })
    }

    /// Names of all queues with a backing file
    pub async fn list_queues(&self) -> Result<Vec<String>> {
        self.store.list_queues().await
    }

    // ==================== Maintenance ====================

    /// Drop every record of the queue. Returns the number of live
    /// (non-tombstoned) records removed.
    pub async fn purge(&self, queue: &str) -> Result<u64> {
        validate_queue_name(queue)?;
        let _guard = self.locks.acquire(queue).await;
        let records = self.store.load_all(queue).await?;
        let count = records.iter().filter(|r| !r.deleted).count() as u64;
        self.store.remove(queue).await?;

        info!(queue = %queue, count = count, "Queue purged");
        Ok(count)
    }

    /// Rewrite the queue file without its tombstoned records. Returns the
    /// number of records dropped.
    pub async fn compact(&self, queue: &str) -> Result<u64> {
        validate_queue_name(queue)?;
        let _guard = self.locks.acquire(queue).await;
        let mut records = self.store.load_all(queue).await?;

        let before = records.len();
        records.retain(|r| !r.deleted);
        let dropped = (before - records.len()) as u64;
        if dropped > 0 {
            self.store.rewrite_all(queue, &records).await?;
            debug!(queue = %queue, dropped = dropped, "Queue compacted");
        }
        Ok(dropped)
    }

    /// Compact every queue under the base directory
    pub async fn compact_all(&self) -> Result<u64> {
        let mut dropped = 0;
        for queue in self.list_queues().await? {
            dropped += self.compact(&queue).await?;
        }
        Ok(dropped)
    }

    /// Start the background compaction task
    pub async fn start_maintenance(self: &Arc<Self>, interval: std::time::Duration) {
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = service.compact_all().await {
                    tracing::error!(error = %e, "Failed to compact queue files");
                }
            }
        });

        info!("Background maintenance started");
    }
}
