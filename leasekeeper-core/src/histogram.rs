//! Ack latency tracking used to pick deadline extensions.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Shortest deadline extension the service accepts (seconds).
pub const MIN_ACK_DEADLINE_SECS: u32 = 10;
/// Longest deadline extension the service accepts (seconds).
pub const MAX_ACK_DEADLINE_SECS: u32 = 600;

/// Source of deadline-extension recommendations.
#[async_trait]
pub trait DeadlineEstimator: Send + Sync {
    /// Seconds below which `percent` percent of observed ack latencies fall.
    /// Always positive.
    async fn percentile(&self, percent: u8) -> u32;
}

#[derive(Debug, Default)]
struct HistogramState {
    buckets: BTreeMap<u32, u64>,
    len: u64,
}

/// Bucketed histogram of ack latencies in whole seconds, clamped to the
/// deadline range the service supports.
#[derive(Default)]
pub struct AckHistogram {
    state: Mutex<HistogramState>,
}

impl fmt::Debug for AckHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AckHistogram");
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("len", &state.len)
                    .field("bucket_count", &state.buckets.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl AckHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one ack latency.
    pub async fn add(&self, seconds: u32) {
        let value = seconds.clamp(MIN_ACK_DEADLINE_SECS, MAX_ACK_DEADLINE_SECS);
        let mut state = self.state.lock().await;
        *state.buckets.entry(value).or_insert(0) += 1;
        state.len += 1;
    }

    pub async fn len(&self) -> u64 {
        self.state.lock().await.len
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn min(&self) -> u32 {
        let state = self.state.lock().await;
        state
            .buckets
            .keys()
            .next()
            .copied()
            .unwrap_or(MIN_ACK_DEADLINE_SECS)
    }

    pub async fn max(&self) -> u32 {
        let state = self.state.lock().await;
        state
            .buckets
            .keys()
            .next_back()
            .copied()
            .unwrap_or(MAX_ACK_DEADLINE_SECS)
    }
}

#[async_trait]
impl DeadlineEstimator for AckHistogram {
    async fn percentile(&self, percent: u8) -> u32 {
        let percent = f64::from(percent.min(100));
        let state = self.state.lock().await;

        let mut target = state.len as f64 * (100.0 - percent) / 100.0;
        for (&seconds, &count) in state.buckets.iter().rev() {
            target -= count as f64;
            if target < 0.0 {
                return seconds;
            }
        }

        MIN_ACK_DEADLINE_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_histogram_uses_bounds() {
        let histogram = AckHistogram::new();
        assert!(histogram.is_empty().await);
        assert_eq!(histogram.min().await, MIN_ACK_DEADLINE_SECS);
        assert_eq!(histogram.max().await, MAX_ACK_DEADLINE_SECS);
        assert_eq!(histogram.percentile(99).await, MIN_ACK_DEADLINE_SECS);
    }

    #[tokio::test]
    async fn add_clamps_into_deadline_range() {
        let histogram = AckHistogram::new();
        histogram.add(1).await;
        histogram.add(5_000).await;

        assert_eq!(histogram.len().await, 2);
        assert_eq!(histogram.min().await, MIN_ACK_DEADLINE_SECS);
        assert_eq!(histogram.max().await, MAX_ACK_DEADLINE_SECS);
    }

    #[tokio::test]
    async fn percentile_walks_from_the_top() {
        let histogram = AckHistogram::new();
        for _ in 0..90 {
            histogram.add(20).await;
        }
        for _ in 0..10 {
            histogram.add(300).await;
        }

        assert_eq!(histogram.percentile(99).await, 300);
        assert_eq!(histogram.percentile(90).await, 20);
        assert_eq!(histogram.percentile(50).await, 20);
    }

    #[tokio::test]
    async fn percentile_above_hundred_is_clamped() {
        let histogram = AckHistogram::new();
        histogram.add(42).await;
        histogram.add(120).await;

        assert_eq!(histogram.percentile(250).await, histogram.percentile(100).await);
        assert_eq!(histogram.percentile(100).await, 120);
    }
}
