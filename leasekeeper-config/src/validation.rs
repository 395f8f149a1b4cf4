use thiserror::Error;

use crate::loader::LeaserConfig;

/// Settings that would leave the maintenance loop unable to keep leases alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("flow_control.max_lease_duration_secs must be greater than zero")]
    ZeroMaxLeaseDuration,
    #[error("lease.max_snooze_ms must be greater than zero")]
    ZeroMaxSnooze,
    #[error("lease.min_snooze_ms ({min}) must be below lease.max_snooze_ms ({max})")]
    SnoozeBoundsInverted { min: u64, max: u64 },
    #[error("lease.ack_deadline_percentile must be within 1..=100, got {0}")]
    PercentileOutOfRange(u8),
    #[error("lease.event_channel_capacity must be greater than zero")]
    ZeroEventCapacity,
}

impl LeaserConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.flow_control.max_lease_duration_secs == 0 {
            return Err(ConfigValidationError::ZeroMaxLeaseDuration);
        }

        let lease = &self.lease;
        if lease.max_snooze_ms == 0 {
            return Err(ConfigValidationError::ZeroMaxSnooze);
        }
        if lease.min_snooze_ms >= lease.max_snooze_ms {
            return Err(ConfigValidationError::SnoozeBoundsInverted {
                min: lease.min_snooze_ms,
                max: lease.max_snooze_ms,
            });
        }
        if !(1..=100).contains(&lease.ack_deadline_percentile) {
            return Err(ConfigValidationError::PercentileOutOfRange(
                lease.ack_deadline_percentile,
            ));
        }
        if lease.event_channel_capacity == 0 {
            return Err(ConfigValidationError::ZeroEventCapacity);
        }

        Ok(())
    }
}
