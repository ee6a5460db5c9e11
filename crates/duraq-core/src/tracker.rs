//! Receipt-handle resolution against persisted lease state.

use chrono::{DateTime, Utc};
use duraq_types::{Error, MessageRecord, ReceiptHandle, Result};

/// Resolve a receipt handle to the record it currently leases.
///
/// Lease state lives entirely in the record set, so resolution behaves
/// identically after a process restart. A handle is valid exactly for
/// the lease window it was minted in: once the lease expires the handle
/// answers `ExpiredHandle` even though the message has not yet been
/// re-leased, and once the message is re-leased (or deleted) the old
/// handle answers `UnknownHandle`.
pub(crate) fn resolve<'a>(
    records: &'a mut [MessageRecord],
    handle: &ReceiptHandle,
    now: DateTime<Utc>,
) -> Result<&'a mut MessageRecord> {
    let position = records.iter().position(|record| {
        !record.deleted && record.lease_owner_handle.as_deref() == Some(handle.as_str())
    });

    match position {
        Some(idx) => {
            let record = &mut records[idx];
            match record.lease_expires_at {
                Some(expires_at) if expires_at > now => Ok(record),
                _ => Err(Error::ExpiredHandle(handle.to_string())),
            }
        }
        None => Err(Error::UnknownHandle(handle.to_string())),
    }
}
