//! Visibility scanning and lease bookkeeping over a loaded record set.

use chrono::{DateTime, Duration, Utc};
use duraq_types::{MessageRecord, QueueConfig, ReceiptHandle};

/// Indices of the currently visible records, oldest `enqueued_at` first;
/// ties keep file order.
pub(crate) fn visible_indices(records: &[MessageRecord], now: DateTime<Utc>) -> Vec<usize> {
    let mut indices: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.is_visible(now))
        .map(|(idx, _)| idx)
        .collect();
    indices.sort_by_key(|&idx| (records[idx].enqueued_at, idx));
    indices
}

/// Grant a lease: mint a fresh receipt handle, stamp the lease expiry,
/// and count the delivery. The handle replaces any prior one, which makes
/// handles from earlier deliveries of the same message inert.
pub(crate) fn grant_lease(
    record: &mut MessageRecord,
    visibility_timeout_ms: u64,
    now: DateTime<Utc>,
) -> ReceiptHandle {
    let handle = ReceiptHandle::generate();
    record.lease_owner_handle = Some(handle.0.clone());
    record.lease_expires_at = Some(now + Duration::milliseconds(visibility_timeout_ms as i64));
    record.receive_count += 1;
    handle
}

/// Backoff applied by `nack(retry: false)`: exponential in the number of
/// deliveries so far, `base * 2^(receive_count - 1)`, capped at the
/// configured ceiling.
pub(crate) fn retry_backoff(config: &QueueConfig, receive_count: u32) -> Duration {
    let exponent = receive_count.saturating_sub(1).min(32);
    let delay_ms = config
        .retry_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_retry_backoff_ms);
    Duration::milliseconds(delay_ms as i64)
}
