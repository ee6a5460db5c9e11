//! Duraq Core - Core logic for the local durable queue
//!
//! This crate contains the queue implementation:
//! - LocalQueue: the public operation surface
//! - Visibility/lease scanning over loaded record sets
//! - Receipt-handle resolution
//! - Dead-letter routing

pub mod dlq;
pub mod queue;

mod locks;
mod manager;
mod tracker;

// Re-exports
pub use dlq::PRIOR_RECEIVE_COUNT_ATTRIBUTE;
pub use queue::LocalQueue;
