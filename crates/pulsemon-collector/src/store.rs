//! Per-cycle sample buffer.

use pulsemon_common::metric::Metric;

/// Append-only list of metrics, rebuilt at the start of every sampling
/// cycle. Snapshots are owned copies suitable for encoding off-task.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Vec<Metric>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn append(&mut self, metric: Metric) {
        self.samples.push(metric);
    }

    pub fn snapshot(&self) -> Vec<Metric> {
        self.samples.clone()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
