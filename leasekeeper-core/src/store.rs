//! Lock-guarded table of leased messages and their byte accounting.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::events::LeaseAnomaly;
use crate::requests::{DropRequest, LeaseRequest};

/// A message currently checked out by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    pub ack_id: String,
    pub byte_size: u64,
    pub added_time: DateTime<Utc>,
}

/// Outcome of one expiry classification pass. Every ack id held when the
/// pass ran lands in exactly one of the two lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeasePartition {
    /// Ack ids still within the maximum lease duration, sorted.
    pub renewable: Vec<String>,
    /// Leases that outlived the maximum lease duration. They have already
    /// been removed from the store; `byte_size` is the recorded size.
    pub expired: Vec<DropRequest>,
    /// Bytes actually subtracted from the aggregate while removing `expired`.
    pub reclaimed_bytes: u64,
    /// Accounting anomalies raised while removing `expired`.
    pub anomalies: Vec<LeaseAnomaly>,
}

#[derive(Debug, Default)]
struct LeaseTable {
    leases: HashMap<String, Lease>,
    bytes: u64,
}

impl LeaseTable {
    fn add(
        &mut self,
        ack_id: &str,
        byte_size: u64,
        now: DateTime<Utc>,
    ) -> Option<LeaseAnomaly> {
        if self.leases.contains_key(ack_id) {
            debug!(
                target: "leaser::store",
                ack_id = %ack_id,
                "message is already lease managed"
            );
            return Some(LeaseAnomaly::AlreadyManaged {
                ack_id: ack_id.to_string(),
            });
        }

        self.leases.insert(
            ack_id.to_string(),
            Lease {
                ack_id: ack_id.to_string(),
                byte_size,
                added_time: now,
            },
        );
        self.bytes = self.bytes.saturating_add(byte_size);
        None
    }

    fn remove(&mut self, ack_id: &str, byte_size: u64) -> Option<LeaseAnomaly> {
        let Some(lease) = self.leases.remove(ack_id) else {
            debug!(target: "leaser::store", ack_id = %ack_id, "message was not managed");
            return Some(LeaseAnomaly::NotManaged {
                ack_id: ack_id.to_string(),
            });
        };

        if lease.byte_size != byte_size {
            trace!(
                target: "leaser::store",
                ack_id = %ack_id,
                recorded = lease.byte_size,
                declared = byte_size,
                "removal declared a different size than was recorded"
            );
        }

        match self.bytes.checked_sub(byte_size) {
            Some(remaining) => {
                self.bytes = remaining;
                None
            }
            None => {
                debug!(
                    target: "leaser::store",
                    ack_id = %ack_id,
                    declared = byte_size,
                    available = self.bytes,
                    "byte count was unexpectedly negative; clamping to zero"
                );
                let available = self.bytes;
                self.bytes = 0;
                Some(LeaseAnomaly::NegativeBytes {
                    ack_id: ack_id.to_string(),
                    declared: byte_size,
                    available,
                })
            }
        }
    }
}

/// Concurrent-safe lease table. Every read-then-write sequence runs under a
/// single lock so aggregate counters never drift from the table contents.
#[derive(Default)]
pub struct LeaseStore {
    table: Mutex<LeaseTable>,
}

impl fmt::Debug for LeaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("LeaseStore");
        match self.table.try_lock() {
            Ok(table) => {
                debug
                    .field("message_count", &table.leases.len())
                    .field("bytes", &table.bytes);
            }
            Err(_) => {
                debug.field("table", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl LeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start managing `ack_id`. An ack id that is already held keeps its
    /// original lease and yields [`LeaseAnomaly::AlreadyManaged`].
    pub async fn add(
        &self,
        ack_id: &str,
        byte_size: u64,
        now: DateTime<Utc>,
    ) -> Option<LeaseAnomaly> {
        self.table.lock().await.add(ack_id, byte_size, now)
    }

    /// Stop managing `ack_id`, subtracting the declared `byte_size`.
    pub async fn remove(&self, ack_id: &str, byte_size: u64) -> Option<LeaseAnomaly> {
        self.table.lock().await.remove(ack_id, byte_size)
    }

    /// Add a batch under one lock acquisition, stamping every lease with `now`.
    pub async fn add_all(
        &self,
        requests: &[LeaseRequest],
        now: DateTime<Utc>,
    ) -> Vec<LeaseAnomaly> {
        let mut table = self.table.lock().await;
        requests
            .iter()
            .filter_map(|request| table.add(&request.ack_id, request.byte_size, now))
            .collect()
    }

    /// Remove a batch under one lock acquisition.
    pub async fn remove_all(&self, requests: &[DropRequest]) -> Vec<LeaseAnomaly> {
        let mut table = self.table.lock().await;
        requests
            .iter()
            .filter_map(|request| table.remove(&request.ack_id, request.byte_size))
            .collect()
    }

    /// Split the table at the expiry boundary. Leases whose age exceeds
    /// `max_lease_duration` are removed with their recorded size, under the
    /// same byte clamping as [`LeaseStore::remove`], and returned as drop
    /// requests; everything else is reported as renewable.
    pub async fn partition_expired(
        &self,
        now: DateTime<Utc>,
        max_lease_duration: chrono::Duration,
    ) -> LeasePartition {
        let mut table = self.table.lock().await;

        let mut partition = LeasePartition::default();
        for lease in table.leases.values() {
            if now.signed_duration_since(lease.added_time) > max_lease_duration {
                partition
                    .expired
                    .push(DropRequest::new(lease.ack_id.clone(), lease.byte_size));
            } else {
                partition.renewable.push(lease.ack_id.clone());
            }
        }

        partition.renewable.sort_unstable();
        partition.expired.sort_unstable_by(|a, b| a.ack_id.cmp(&b.ack_id));

        let before = table.bytes;
        for expired in &partition.expired {
            if let Some(anomaly) = table.remove(&expired.ack_id, expired.byte_size) {
                partition.anomalies.push(anomaly);
            }
        }
        partition.reclaimed_bytes = before - table.bytes;
        partition
    }

    pub async fn get(&self, ack_id: &str) -> Option<Lease> {
        self.table.lock().await.leases.get(ack_id).cloned()
    }

    pub async fn ack_ids(&self) -> HashSet<String> {
        self.table.lock().await.leases.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.table.lock().await.leases.len()
    }

    pub async fn total_bytes(&self) -> u64 {
        self.table.lock().await.bytes
    }
}
