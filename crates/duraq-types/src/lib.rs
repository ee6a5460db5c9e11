//! Duraq Types - Core domain types for the local durable queue
//!
//! This crate contains all shared types used across duraq components.

pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types
pub use error::{Error, Result};
pub use message::{
    MessageId, MessageRecord, ReceiptHandle, ReceiveOptions, ReceivedMessage, SendOptions,
};
pub use queue::{validate_queue_name, QueueAttributes, QueueConfig};
