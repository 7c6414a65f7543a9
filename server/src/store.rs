use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::flow::{now_ts, FlowRecord};

/// Default retention capacity, in records.
pub const DEFAULT_CAPACITY: usize = 200_000;

/// In-memory storage for recent [`FlowRecord`]s.
///
/// A bounded ring: append is cheap and the capacity cap keeps memory
/// bounded under bursts — the oldest records are discarded rather than
/// applying backpressure to collectors. `recent()` scans the buffer
/// linearly, which the capacity bound keeps acceptable.
pub struct FlowStore {
    capacity: usize,
    flows: Mutex<VecDeque<FlowRecord>>,
}

impl FlowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            flows: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append decoded records in order, evicting the oldest on overflow.
    pub async fn add_many(&self, records: Vec<FlowRecord>) {
        let mut flows = self.flows.lock().await;
        for record in records {
            if flows.len() == self.capacity {
                flows.pop_front();
            }
            flows.push_back(record);
        }
    }

    /// Snapshot of all records with `ts >= now - seconds`, in arrival
    /// order. The snapshot is independent of later mutations.
    pub async fn recent(&self, seconds: u64) -> Vec<FlowRecord> {
        let cutoff = now_ts() - seconds as f64;
        let flows = self.flows.lock().await;
        flows.iter().filter(|f| f.ts >= cutoff).cloned().collect()
    }

    /// Number of records currently retained.
    pub async fn len(&self) -> usize {
        self.flows.lock().await.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FlowStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
