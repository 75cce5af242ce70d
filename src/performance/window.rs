use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prediction::SingleModelPrediction;

/// Fixed-capacity FIFO. Once full, each push overwrites the oldest slot.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    // Index of the oldest element once the buffer has wrapped.
    head: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append, returning the evicted element when at capacity.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
            return None;
        }

        let evicted = std::mem::replace(&mut self.slots[self.head], item);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Oldest to newest.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        let (newer, older) = self.slots.split_at_mut(self.head);
        older.iter_mut().chain(newer.iter_mut())
    }

    pub fn newest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else if self.head == 0 {
            self.slots.last()
        } else {
            self.slots.get(self.head - 1)
        }
    }
}

/// One observed prediction, optionally validated against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeRecord {
    pub symbol: String,
    pub predicted_value: f64,
    pub actual_outcome: Option<f64>,
    pub confidence: f64,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn from_prediction(prediction: &SingleModelPrediction, actual: Option<f64>) -> Self {
        Self {
            symbol: prediction.symbol.clone(),
            predicted_value: prediction.predicted_value,
            actual_outcome: actual,
            confidence: prediction.confidence,
            latency_ms: prediction.latency_ms,
            timestamp: prediction.timestamp,
        }
    }

    pub fn is_validated(&self) -> bool {
        self.actual_outcome.is_some()
    }
}

/// Per-model rolling state: outcome window plus latency samples.
#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    records: RingBuffer<OutcomeRecord>,
    latencies: RingBuffer<f64>,
}

impl PerformanceWindow {
    pub fn new(window_capacity: usize, latency_capacity: usize) -> Self {
        Self {
            records: RingBuffer::new(window_capacity),
            latencies: RingBuffer::new(latency_capacity),
        }
    }

    pub fn push(&mut self, record: OutcomeRecord) {
        self.latencies.push(record.latency_ms);
        self.records.push(record);
    }

    /// Fill in ground truth for the newest matching record that still lacks it.
    pub fn backfill(&mut self, symbol: &str, timestamp: DateTime<Utc>, actual: f64) -> bool {
        match self
            .records
            .iter_mut()
            .rev()
            .find(|r| r.symbol == symbol && r.timestamp == timestamp && r.actual_outcome.is_none())
        {
            Some(record) => {
                record.actual_outcome = Some(actual);
                true
            }
            None => false,
        }
    }

    pub fn records(&self) -> impl DoubleEndedIterator<Item = &OutcomeRecord> {
        self.records.iter()
    }

    pub fn validated(&self) -> Vec<&OutcomeRecord> {
        self.records.iter().filter(|r| r.is_validated()).collect()
    }

    pub fn latency_samples(&self) -> Vec<f64> {
        self.latencies.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.newest().map(|r| r.timestamp)
    }
}
