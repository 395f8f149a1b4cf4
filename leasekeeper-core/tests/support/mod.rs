#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use leasekeeper_core::{
    AckHistogram, DeadlineEstimator, DropRequest, FlowControl, Leaser, ManualTimeProvider,
    ModAckRequest, Subscriber,
};
use tokio::sync::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Subscriber double that records every batched call the leaser makes.
pub struct RecordingSubscriber {
    active: AtomicBool,
    flow_control: FlowControl,
    histogram: AckHistogram,
    pub mod_acks: Mutex<Vec<Vec<ModAckRequest>>>,
    pub drops: Mutex<Vec<Vec<DropRequest>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Self::with_flow_control(FlowControl::default())
    }

    pub fn with_flow_control(flow_control: FlowControl) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            flow_control,
            histogram: AckHistogram::new(),
            mod_acks: Mutex::new(Vec::new()),
            drops: Mutex::new(Vec::new()),
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub async fn mod_ack_calls(&self) -> Vec<Vec<ModAckRequest>> {
        self.mod_acks.lock().await.clone()
    }

    pub async fn drop_calls(&self) -> Vec<Vec<DropRequest>> {
        self.drops.lock().await.clone()
    }

    pub fn histogram(&self) -> &AckHistogram {
        &self.histogram
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn flow_control(&self) -> FlowControl {
        self.flow_control
    }

    fn ack_histogram(&self) -> &dyn DeadlineEstimator {
        &self.histogram
    }

    async fn modify_ack_deadline(&self, requests: Vec<ModAckRequest>) {
        self.mod_acks.lock().await.push(requests);
    }

    async fn drop_leases(&self, requests: Vec<DropRequest>) {
        self.drops.lock().await.push(requests);
    }
}

/// A leaser on a manual clock whose first sleep marks the subscriber
/// inactive, so `maintain_leases` runs exactly one pass.
pub fn single_pass_leaser(subscriber: &Arc<RecordingSubscriber>) -> (Leaser, ManualTimeProvider) {
    let clock = ManualTimeProvider::new();
    let hooked = Arc::clone(subscriber);
    clock.on_sleep(move |seconds| {
        assert!(seconds > Duration::ZERO && seconds < Duration::from_secs(10));
        hooked.set_active(false);
    });

    let leaser = Leaser::builder(subscriber.clone())
        .with_time_provider(Arc::new(clock.clone()))
        .build();
    (leaser, clock)
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
