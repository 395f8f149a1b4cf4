use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::clock::{SystemTimeProvider, TimeProvider};
use crate::config::LeaseTuning;
use crate::error::{LeaseError, Result};
use crate::events::{LeaseAnomaly, LeaseEvent, LeaseEventBus, WorkerExit};
use crate::maintenance::{LEASE_WORKER_NAME, LeaseMaintainer, MaintenanceCycle};
use crate::requests::{DropRequest, LeaseRequest};
use crate::store::LeaseStore;
use crate::subscriber::Subscriber;

#[derive(Debug, Default)]
struct WorkerSlot {
    stop: CancellationToken,
    handle: Option<JoinHandle<WorkerExit>>,
}

/// Keeps received-but-unacknowledged messages leased.
///
/// Callers `add` messages as they are received and `remove` them once they
/// are acked or nacked. While started, a background worker periodically
/// extends the ack deadline of every held message and drops messages that
/// have been held longer than the subscriber's max lease duration.
///
/// `stop` waits for the worker to finish, so it must not be awaited from
/// inside the subscriber's `modify_ack_deadline` or `drop_leases` callbacks.
pub struct Leaser {
    maintainer: Arc<LeaseMaintainer>,
    worker: Mutex<WorkerSlot>,
}

impl fmt::Debug for Leaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self
            .worker
            .try_lock()
            .map(|slot| slot.handle.is_some())
            .ok();

        f.debug_struct("Leaser")
            .field("maintainer", &self.maintainer)
            .field("running", &running)
            .finish()
    }
}

impl Leaser {
    pub fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        LeaserBuilder::new(subscriber).build()
    }

    pub fn builder(subscriber: Arc<dyn Subscriber>) -> LeaserBuilder {
        LeaserBuilder::new(subscriber)
    }

    /// Start leasing every message in `requests`. Ack ids that are already
    /// managed are skipped and reported; the rest of the batch still applies.
    pub async fn add(&self, requests: &[LeaseRequest]) -> Vec<LeaseAnomaly> {
        let now = self.maintainer.clock.utc_now();
        let anomalies = self.maintainer.store.add_all(requests, now).await;
        self.maintainer.events.publish_anomalies(anomalies.iter().cloned());
        anomalies
    }

    /// Stop leasing every message in `requests`. Unknown ack ids and byte
    /// underflow are reported; the rest of the batch still applies.
    pub async fn remove(&self, requests: &[DropRequest]) -> Vec<LeaseAnomaly> {
        let anomalies = self.maintainer.store.remove_all(requests).await;
        self.maintainer.events.publish_anomalies(anomalies.iter().cloned());
        anomalies
    }

    /// Spawn the maintenance worker on the current tokio runtime.
    ///
    /// Fails with [`LeaseError::InvalidState`] if a worker is already held;
    /// call [`Leaser::stop`] first.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.worker.lock().await;
        if slot.handle.is_some() {
            return Err(LeaseError::InvalidState("Leaser is already running.".into()));
        }

        let stop = CancellationToken::new();
        slot.stop = stop.clone();

        let maintainer = Arc::clone(&self.maintainer);
        let handle = tokio::spawn(
            async move { maintainer.run(stop).await }.instrument(info_span!(LEASE_WORKER_NAME)),
        );
        slot.handle = Some(handle);
        debug!(target: "leaser::worker", "lease maintenance worker started");
        Ok(())
    }

    /// Signal the worker to stop and wait for it to exit. No deadline
    /// extensions or drops are issued once this returns. Safe to call when
    /// nothing was started.
    pub async fn stop(&self) {
        let mut slot = self.worker.lock().await;
        slot.stop.cancel();

        if let Some(handle) = slot.handle.take() {
            match handle.await.map_err(LeaseError::from) {
                Ok(reason) => {
                    debug!(
                        target: "leaser::worker",
                        reason = ?reason,
                        "lease maintenance worker joined"
                    );
                }
                Err(err) => {
                    warn!(
                        target: "leaser::worker",
                        error = %err,
                        "lease maintenance worker did not exit cleanly"
                    );
                }
            }
        }
    }

    /// Run the maintenance loop on the calling task until the subscriber
    /// goes inactive or [`Leaser::stop`] is called.
    pub async fn maintain_leases(&self) -> WorkerExit {
        let stop = self.worker.lock().await.stop.clone();
        self.maintainer.run(stop).await
    }

    /// Run a single maintenance pass without sleeping. The subscriber's
    /// activity flag and any pending stop request are not consulted.
    pub async fn maintain_once(&self) -> MaintenanceCycle {
        self.maintainer.run_cycle().await
    }

    /// Whether a worker spawned by [`Leaser::start`] is still held.
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.handle.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.maintainer.events.subscribe()
    }

    pub async fn message_count(&self) -> usize {
        self.maintainer.store.count().await
    }

    pub async fn bytes(&self) -> u64 {
        self.maintainer.store.total_bytes().await
    }

    pub async fn ack_ids(&self) -> HashSet<String> {
        self.maintainer.store.ack_ids().await
    }
}

impl Drop for Leaser {
    fn drop(&mut self) {
        self.worker.get_mut().stop.cancel();
    }
}

/// Builder for a [`Leaser`] with a non-default clock or tuning.
pub struct LeaserBuilder {
    subscriber: Arc<dyn Subscriber>,
    clock: Arc<dyn TimeProvider>,
    tuning: LeaseTuning,
}

impl fmt::Debug for LeaserBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaserBuilder")
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl LeaserBuilder {
    pub fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            clock: Arc::new(SystemTimeProvider),
            tuning: LeaseTuning::default(),
        }
    }

    pub fn with_time_provider(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tuning(mut self, tuning: LeaseTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn build(self) -> Leaser {
        let maintainer = LeaseMaintainer {
            subscriber: self.subscriber,
            store: LeaseStore::new(),
            clock: self.clock,
            events: LeaseEventBus::new(self.tuning.event_channel_capacity),
            tuning: self.tuning,
        };

        Leaser {
            maintainer: Arc::new(maintainer),
            worker: Mutex::new(WorkerSlot::default()),
        }
    }
}
