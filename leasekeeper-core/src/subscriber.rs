use async_trait::async_trait;

use crate::config::FlowControl;
use crate::histogram::DeadlineEstimator;
use crate::requests::{DropRequest, ModAckRequest};

/// The consumer session that owns a [`Leaser`](crate::Leaser).
///
/// The leaser reads session state through this trait once per maintenance
/// pass and hands batched deadline extensions and drops back to it. Transport
/// errors are the implementor's concern; the leaser neither retries nor
/// inspects them.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// `false` once the session is shutting down. The maintenance loop exits
    /// the next time it observes this.
    fn is_active(&self) -> bool;

    fn flow_control(&self) -> FlowControl;

    /// Recommends how far to push ack deadlines, typically from observed ack
    /// latencies.
    fn ack_histogram(&self) -> &dyn DeadlineEstimator;

    /// Extend the deadlines of every message in `requests`.
    async fn modify_ack_deadline(&self, requests: Vec<ModAckRequest>);

    /// Messages the leaser gave up on because they were leased for longer than
    /// the maximum lease duration. Implementations usually release the
    /// matching flow-control capacity here.
    async fn drop_leases(&self, requests: Vec<DropRequest>);
}
