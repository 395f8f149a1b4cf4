//! Value types exchanged with callers and with the subscriber collaborator.

use serde::{Deserialize, Serialize};

/// Asks the leaser to start managing a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub ack_id: String,
    pub byte_size: u64,
}

impl LeaseRequest {
    pub fn new(ack_id: impl Into<String>, byte_size: u64) -> Self {
        Self {
            ack_id: ack_id.into(),
            byte_size,
        }
    }
}

/// Asks the leaser to stop managing a message, or tells the subscriber that a
/// message was dropped because it was leased for too long.
///
/// `byte_size` should match the size recorded when the lease was added; the
/// store subtracts the declared value from its byte total either way.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropRequest {
    pub ack_id: String,
    pub byte_size: u64,
}

impl DropRequest {
    pub fn new(ack_id: impl Into<String>, byte_size: u64) -> Self {
        Self {
            ack_id: ack_id.into(),
            byte_size,
        }
    }
}

/// Extends the ack deadline of a single message by `seconds`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModAckRequest {
    pub ack_id: String,
    pub seconds: u32,
}

impl ModAckRequest {
    pub fn new(ack_id: impl Into<String>, seconds: u32) -> Self {
        Self {
            ack_id: ack_id.into(),
            seconds,
        }
    }
}
