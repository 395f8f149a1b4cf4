//! Structured diagnostics emitted by the leaser.
//!
//! Anomalies never interrupt processing. They are returned from the batch
//! call that produced them and fanned out to every subscriber of the
//! [`LeaseEventBus`], alongside maintenance outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Non-fatal data-consistency conditions observed by the lease store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeaseAnomaly {
    /// `add` for an ack id that is already leased; the existing lease is kept.
    AlreadyManaged { ack_id: String },
    /// `remove` for an ack id the store does not hold.
    NotManaged { ack_id: String },
    /// A removal declared more bytes than the store was tracking; the total
    /// was clamped to zero.
    NegativeBytes {
        ack_id: String,
        declared: u64,
        available: u64,
    },
}

impl LeaseAnomaly {
    pub fn ack_id(&self) -> &str {
        match self {
            LeaseAnomaly::AlreadyManaged { ack_id }
            | LeaseAnomaly::NotManaged { ack_id }
            | LeaseAnomaly::NegativeBytes { ack_id, .. } => ack_id,
        }
    }
}

impl fmt::Display for LeaseAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseAnomaly::AlreadyManaged { ack_id } => {
                write!(f, "message {ack_id} is already lease managed")
            }
            LeaseAnomaly::NotManaged { ack_id } => write!(f, "message {ack_id} was not managed"),
            LeaseAnomaly::NegativeBytes {
                ack_id,
                declared,
                available,
            } => write!(
                f,
                "removing {ack_id} ({declared} bytes) exceeds the {available} bytes held"
            ),
        }
    }
}

/// Why the maintenance worker stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// The owning subscriber reported itself inactive.
    Inactive,
    /// `stop()` was requested.
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeaseEvent {
    Anomaly(LeaseAnomaly),
    /// One batched deadline extension was issued.
    Renewed { count: usize, seconds: u32 },
    /// Leases held past the maximum lease duration were dropped.
    Dropped { count: usize, bytes: u64 },
    WorkerExited { reason: WorkerExit },
}

/// In-process fan-out of [`LeaseEvent`]s. Sending with no subscribers is not
/// an error; lagging subscribers lose the oldest events.
pub struct LeaseEventBus {
    sender: broadcast::Sender<LeaseEvent>,
    capacity: usize,
}

impl fmt::Debug for LeaseEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl LeaseEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LeaseEvent) {
        let _ = self.sender.send(event);
    }

    pub fn publish_anomalies<I>(&self, anomalies: I)
    where
        I: IntoIterator<Item = LeaseAnomaly>,
    {
        for anomaly in anomalies {
            self.publish(LeaseEvent::Anomaly(anomaly));
        }
    }
}
