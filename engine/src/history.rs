//! Bounded per-metric sample history
//!
//! Each metric keeps at most `capacity` samples; pushing into a full ring
//! evicts the oldest sample first.

use std::collections::{BTreeMap, VecDeque};

use crate::types::Sample;

/// Ring buffer of recent samples, one ring per metric
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    rings: BTreeMap<String, VecDeque<Sample>>,
    evicted: u64,
}

impl HistoryBuffer {
    /// Create a buffer holding up to `capacity` samples per metric.
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: BTreeMap::new(),
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, sample: Sample) {
        let capacity = self.capacity;
        let ring = self
            .rings
            .entry(sample.name.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        while ring.len() >= capacity {
            ring.pop_front();
            self.evicted += 1;
        }
        ring.push_back(sample);
    }

    pub fn extend<I: IntoIterator<Item = Sample>>(&mut self, samples: I) {
        for sample in samples {
            self.push(sample);
        }
    }

    /// Number of samples held for `metric`
    pub fn len(&self, metric: &str) -> usize {
        self.rings.get(metric).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rings.values().all(VecDeque::is_empty)
    }

    /// Samples across all metrics
    pub fn total_len(&self) -> usize {
        self.rings.values().map(VecDeque::len).sum()
    }

    /// Samples evicted since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.rings.keys().map(String::as_str)
    }

    /// Oldest-first copy of the samples held for `metric`
    pub fn window(&self, metric: &str) -> Vec<Sample> {
        self.rings
            .get(metric)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All held samples ordered by timestamp, ties broken by metric name
    pub fn snapshot(&self) -> Vec<Sample> {
        let mut samples: Vec<Sample> = self.rings.values().flat_map(|ring| ring.iter().cloned()).collect();
        samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
        samples
    }
}
