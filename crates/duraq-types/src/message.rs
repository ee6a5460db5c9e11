//! Message types for duraq
//!
//! Defines the durable message record and the ephemeral types minted
//! around it (receipt handles, receive results, send/receive options).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new random MessageId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability token returned by `receive`, required to ack or nack the
/// lease it was minted for. A fresh handle is minted on every lease grant,
/// so handles from a prior delivery of the same message are inert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    /// Mint a new opaque receipt handle
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One durable message record — one JSON line in a queue file.
///
/// Timestamps serialize as RFC 3339 (ISO-8601) strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique message identifier, generated at send time
    pub message_id: MessageId,

    /// Opaque payload, already serialized by the caller
    pub body: String,

    /// Custom attributes set by the producer
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// When the message was first sent
    pub enqueued_at: DateTime<Utc>,

    /// The message must not be delivered before this instant
    /// (delayed send and retry backoff both land here)
    pub visible_at: DateTime<Utc>,

    /// Number of times this message has been leased to a consumer
    #[serde(default)]
    pub receive_count: u32,

    /// Receipt handle currently holding the lease, if any
    #[serde(default)]
    pub lease_owner_handle: Option<String>,

    /// Instant after which the current lease counts as abandoned
    #[serde(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Tombstone flag; a deleted record is logically gone and is
    /// physically dropped by compaction
    #[serde(default)]
    pub deleted: bool,
}

impl MessageRecord {
    /// Create a new record, visible immediately.
    pub fn new(body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            message_id: MessageId::new(),
            body: body.into(),
            attributes: HashMap::new(),
            enqueued_at: now,
            visible_at: now,
            receive_count: 0,
            lease_owner_handle: None,
            lease_expires_at: None,
            deleted: false,
        }
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Delay initial delivery by the given number of seconds
    pub fn with_delay_seconds(mut self, delay_seconds: u64) -> Self {
        self.visible_at = self.enqueued_at + Duration::seconds(delay_seconds as i64);
        self
    }

    /// A message is visible iff it is not deleted, its delay has elapsed,
    /// and it holds no live lease.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        if self.deleted || self.visible_at > now {
            return false;
        }
        match (&self.lease_owner_handle, self.lease_expires_at) {
            (Some(_), Some(expires_at)) => expires_at <= now,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// A message is in flight iff it holds a live lease and is not deleted.
    pub fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        !self.deleted
            && self.lease_owner_handle.is_some()
            && self.lease_expires_at.map(|exp| exp > now).unwrap_or(false)
    }

    /// Clear lease state, leaving visibility untouched.
    pub fn release_lease(&mut self) {
        self.lease_owner_handle = None;
        self.lease_expires_at = None;
    }
}

/// Options accepted by `send`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendOptions {
    /// Seconds before the message becomes deliverable
    #[serde(default)]
    pub delay_seconds: Option<u64>,

    /// Producer-set attributes carried with the message
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Options accepted by `receive`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiveOptions {
    /// How long the leased messages stay hidden from other receives,
    /// overriding the configured default
    #[serde(default)]
    pub visibility_timeout_ms: Option<u64>,
}

/// One leased message as handed to a consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedMessage {
    /// Message identifier
    pub id: MessageId,

    /// Message payload
    pub body: String,

    /// Producer-set attributes
    pub attributes: HashMap<String, String>,

    /// Handle required to ack or nack this delivery
    pub receipt_handle: ReceiptHandle,

    /// Number of lease grants including this one
    pub receive_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_visible() {
        let record = MessageRecord::new("hello");
        assert!(record.is_visible(Utc::now()));
        assert!(!record.is_in_flight(Utc::now()));
        assert_eq!(record.receive_count, 0);
    }

    #[test]
    fn test_delayed_record_is_hidden_until_delay_elapses() {
        let record = MessageRecord::new("later").with_delay_seconds(30);
        let now = Utc::now();
        assert!(!record.is_visible(now));
        assert!(record.is_visible(now + Duration::seconds(31)));
    }

    #[test]
    fn test_leased_record_is_hidden_until_lease_expires() {
        let mut record = MessageRecord::new("leased");
        let now = Utc::now();
        record.lease_owner_handle = Some(ReceiptHandle::generate().0);
        record.lease_expires_at = Some(now + Duration::seconds(10));

        assert!(!record.is_visible(now));
        assert!(record.is_in_flight(now));

        let later = now + Duration::seconds(11);
        assert!(record.is_visible(later));
        assert!(!record.is_in_flight(later));
    }

    #[test]
    fn test_tombstoned_record_is_neither_visible_nor_in_flight() {
        let mut record = MessageRecord::new("gone");
        record.deleted = true;
        assert!(!record.is_visible(Utc::now()));
        assert!(!record.is_in_flight(Utc::now()));
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = MessageRecord::new("payload")
            .with_attribute("kind", "alert")
            .with_delay_seconds(5);

        let line = serde_json::to_string(&record).unwrap();
        let parsed: MessageRecord = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed.message_id, record.message_id);
        assert_eq!(parsed.body, "payload");
        assert_eq!(parsed.attributes.get("kind"), Some(&"alert".to_string()));
        assert_eq!(parsed.visible_at, record.visible_at);
        assert!(!parsed.deleted);
    }

    #[test]
    fn test_release_lease_clears_lease_fields_only() {
        let mut record = MessageRecord::new("x");
        record.lease_owner_handle = Some("h".into());
        record.lease_expires_at = Some(Utc::now());
        record.receive_count = 3;

        record.release_lease();

        assert!(record.lease_owner_handle.is_none());
        assert!(record.lease_expires_at.is_none());
        assert_eq!(record.receive_count, 3);
    }
}
