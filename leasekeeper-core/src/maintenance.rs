//! Background lease maintenance: renew what is still within its lease
//! lifetime, drop what outlived it, then pause for a short jittered interval.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::TimeProvider;
use crate::config::{FlowControl, LeaseTuning};
use crate::events::{LeaseEvent, LeaseEventBus, WorkerExit};
use crate::requests::ModAckRequest;
use crate::store::LeaseStore;
use crate::subscriber::Subscriber;

/// Name of the span the maintenance worker runs in.
pub const LEASE_WORKER_NAME: &str = "LeaseMaintainer";

/// Fraction of the current deadline extension the loop may sleep for, so
/// renewals land well before the extended deadline passes.
const SNOOZE_DEADLINE_FRACTION: f64 = 0.9;

/// What a single maintenance pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaintenanceCycle {
    pub renewed: usize,
    pub dropped: usize,
    /// Extension sent with the renewal batch; `None` when nothing was renewed.
    pub extension_seconds: Option<u32>,
    /// Pause before the next pass.
    pub snooze: Duration,
}

/// State shared between the [`Leaser`](crate::Leaser) façade and its worker.
pub(crate) struct LeaseMaintainer {
    pub(crate) subscriber: Arc<dyn Subscriber>,
    pub(crate) store: LeaseStore,
    pub(crate) clock: Arc<dyn TimeProvider>,
    pub(crate) events: LeaseEventBus,
    pub(crate) tuning: LeaseTuning,
}

impl fmt::Debug for LeaseMaintainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseMaintainer")
            .field("store", &self.store)
            .field("events", &self.events)
            .field("tuning", &self.tuning)
            .field("subscriber_active", &self.subscriber.is_active())
            .finish()
    }
}

impl LeaseMaintainer {
    fn exit_reason(&self, stop: &CancellationToken) -> Option<WorkerExit> {
        if stop.is_cancelled() {
            Some(WorkerExit::Stopped)
        } else if !self.subscriber.is_active() {
            Some(WorkerExit::Inactive)
        } else {
            None
        }
    }

    /// Run maintenance passes until `stop` fires or the subscriber goes
    /// inactive. A stop requested mid-sleep ends the pause immediately.
    pub(crate) async fn run(&self, stop: CancellationToken) -> WorkerExit {
        let reason = loop {
            if let Some(reason) = self.exit_reason(&stop) {
                break reason;
            }

            let cycle = self.run_cycle().await;
            debug!(
                target: "leaser::maintenance",
                renewed = cycle.renewed,
                dropped = cycle.dropped,
                extension_seconds = ?cycle.extension_seconds,
                snooze_ms = cycle.snooze.as_millis() as u64,
                "snoozing lease management"
            );

            tokio::select! {
                biased;
                _ = stop.cancelled() => break WorkerExit::Stopped,
                _ = self.clock.sleep(cycle.snooze) => {}
            }
        };

        info!(target: "leaser::worker", reason = ?reason, "{LEASE_WORKER_NAME} exiting");
        self.events.publish(LeaseEvent::WorkerExited { reason });
        reason
    }

    /// One pass over the store: classify, renew, drop, pick the next pause.
    pub(crate) async fn run_cycle(&self) -> MaintenanceCycle {
        let flow = self.subscriber.flow_control();
        let now = self.clock.utc_now();
        let partition = self
            .store
            .partition_expired(now, flow.max_lease_duration())
            .await;
        let renewed = partition.renewable.len();
        let dropped = partition.expired.len();
        self.events.publish_anomalies(partition.anomalies.iter().cloned());

        let mut extension_seconds = None;
        if !partition.renewable.is_empty() {
            let seconds = self
                .subscriber
                .ack_histogram()
                .percentile(self.tuning.ack_deadline_percentile)
                .await
                .max(1);
            debug!(
                target: "leaser::maintenance",
                count = renewed,
                seconds,
                "renewing leases"
            );

            let requests: Vec<ModAckRequest> = partition
                .renewable
                .iter()
                .map(|ack_id| ModAckRequest::new(ack_id.clone(), seconds))
                .collect();
            self.subscriber.modify_ack_deadline(requests).await;
            self.events.publish(LeaseEvent::Renewed {
                count: renewed,
                seconds,
            });
            extension_seconds = Some(seconds);
        }

        if !partition.expired.is_empty() {
            let bytes = partition.reclaimed_bytes;
            warn!(
                target: "leaser::maintenance",
                count = dropped,
                bytes,
                "dropping leases held longer than the max lease duration"
            );
            self.subscriber.drop_leases(partition.expired).await;
            self.events.publish(LeaseEvent::Dropped {
                count: dropped,
                bytes,
            });
        }

        MaintenanceCycle {
            renewed,
            dropped,
            extension_seconds,
            snooze: next_snooze(&self.tuning, &flow, extension_seconds),
        }
    }
}

/// Pick a jittered pause in `[min_snooze, ceiling)`, where the ceiling is the
/// smallest of the configured maximum, 90% of the deadline extension in
/// effect and half the max lease duration. Always positive.
pub fn next_snooze(
    tuning: &LeaseTuning,
    flow: &FlowControl,
    extension_seconds: Option<u32>,
) -> Duration {
    let floor = tuning.min_snooze();

    let mut ceiling = tuning.max_snooze();
    if let Some(seconds) = extension_seconds {
        let extension = Duration::from_secs(u64::from(seconds));
        ceiling = ceiling.min(extension.mul_f64(SNOOZE_DEADLINE_FRACTION));
    }
    ceiling = ceiling.min(Duration::from_secs(flow.max_lease_duration_secs) / 2);

    if ceiling <= floor {
        return floor;
    }
    rand::rng().random_range(floor..ceiling)
}
