//! Lease management for at-least-once message consumers.
//!
//! A [`Leaser`] tracks which received-but-unacknowledged messages are checked
//! out by the consumer and keeps their ack deadlines extended with the
//! delivery service until the consumer removes them. Messages held longer
//! than the subscriber's maximum lease duration are dropped instead of
//! renewed. Network I/O is delegated to the owning [`Subscriber`].

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod histogram;
pub mod leaser;
pub mod maintenance;
pub mod requests;
pub mod store;
pub mod subscriber;

pub use clock::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
pub use config::{FlowControl, LeaseTuning};
pub use error::{LeaseError, Result};
pub use events::{LeaseAnomaly, LeaseEvent, LeaseEventBus, WorkerExit};
pub use histogram::{AckHistogram, DeadlineEstimator};
pub use leaser::{Leaser, LeaserBuilder};
pub use maintenance::{LEASE_WORKER_NAME, MaintenanceCycle, next_snooze};
pub use requests::{DropRequest, LeaseRequest, ModAckRequest};
pub use store::{Lease, LeasePartition, LeaseStore};
pub use subscriber::Subscriber;
