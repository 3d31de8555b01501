//! Bounded per-context traffic history.

use std::collections::VecDeque;

use crate::TrafficRecord;

/// Default number of records retained per context.
pub const DEFAULT_CAPACITY: usize = 500;

/// Fixed-capacity FIFO of traffic records.
///
/// Pushing beyond capacity evicts the single oldest record, so the buffer
/// always holds the most recent `capacity` records in arrival order.
#[derive(Debug, Clone)]
pub struct TrafficBuffer {
    records: VecDeque<TrafficRecord>,
    capacity: usize,
}

impl TrafficBuffer {
    /// Create a buffer holding at most `capacity` records.
    ///
    /// A capacity of zero is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one when full.
    pub fn push(&mut self, record: TrafficRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records newer than `since` (epoch millis, exclusive), keeping only
    /// the last `limit` of them, in insertion order.
    #[must_use]
    pub fn tail_since(&self, since: i64, limit: usize) -> Vec<TrafficRecord> {
        let matching: Vec<&TrafficRecord> = self
            .records
            .iter()
            .filter(|r| r.timestamp > since)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }
}
