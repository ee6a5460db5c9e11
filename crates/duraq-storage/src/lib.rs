//! Duraq Storage - Durable record storage for the local queue
//!
//! This crate provides the record store seam and its file backend:
//! - NDJSON files, one per queue, with append-then-fsync and atomic
//!   temp-file-then-rename rewrites

pub mod traits;

#[cfg(feature = "ndjson")]
pub mod ndjson;

// Re-exports
pub use traits::RecordStore;

#[cfg(feature = "ndjson")]
pub use ndjson::NdjsonStore;
