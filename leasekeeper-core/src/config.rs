use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits supplied by the owning subscriber session.
///
/// Only the lease lifetime is consulted by the leaser; admission limits are
/// enforced above this layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControl {
    /// Maximum time (seconds) a message may stay lease managed before it is
    /// dropped instead of renewed.
    pub max_lease_duration_secs: u64,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self {
            max_lease_duration_secs: 2 * 60 * 60,
        }
    }
}

impl FlowControl {
    pub fn max_lease_duration(&self) -> chrono::Duration {
        i64::try_from(self.max_lease_duration_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Knobs for the lease maintenance loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseTuning {
    /// Percentile of observed ack latency used as the deadline extension.
    pub ack_deadline_percentile: u8,
    /// Upper bound for the pause between two maintenance passes (ms).
    pub max_snooze_ms: u64,
    /// Lower bound for the pause between two maintenance passes (ms). Must be
    /// non-zero so the loop always yields.
    pub min_snooze_ms: u64,
    /// Buffer size of the diagnostics broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for LeaseTuning {
    fn default() -> Self {
        Self {
            ack_deadline_percentile: 99,
            max_snooze_ms: 10_000,
            min_snooze_ms: 100,
            event_channel_capacity: 256,
        }
    }
}

impl LeaseTuning {
    pub fn max_snooze(&self) -> Duration {
        Duration::from_millis(self.max_snooze_ms)
    }

    pub fn min_snooze(&self) -> Duration {
        Duration::from_millis(self.min_snooze_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_control_defaults_to_two_hours() {
        let flow = FlowControl::default();
        assert_eq!(flow.max_lease_duration(), chrono::Duration::hours(2));
    }

    #[test]
    fn min_snooze_never_zero() {
        let tuning = LeaseTuning {
            min_snooze_ms: 0,
            ..LeaseTuning::default()
        };
        assert_eq!(tuning.min_snooze(), Duration::from_millis(1));
    }

    #[test]
    fn partial_tuning_fills_defaults() {
        let tuning: LeaseTuning =
            serde_json::from_str(r#"{"max_snooze_ms": 5000}"#).expect("valid tuning");
        assert_eq!(tuning.max_snooze(), Duration::from_secs(5));
        assert_eq!(tuning.ack_deadline_percentile, 99);
    }
}
