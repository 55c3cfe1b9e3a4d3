//! Process/runtime memory sampler.
//!
//! Emits the fixed catalogue of runtime memory gauges downstream consumers
//! key off, plus the `RandomValue` gauge and the `PollCount` counter. The
//! name → kind table is a contract; entries whose statistic has no direct
//! analogue on this platform report 0.

use async_trait::async_trait;
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::{Metric, MetricKind};
use rand::Rng;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::store::SampleStore;
use crate::Sampler;

pub const RANDOM_VALUE: &str = "RandomValue";
pub const POLL_COUNT: &str = "PollCount";

/// Gauge names emitted every cycle, in emission order.
pub const RUNTIME_GAUGES: [&str; 28] = [
    "Alloc",
    "TotalAlloc",
    "Sys",
    "Lookups",
    "Mallocs",
    "Frees",
    "HeapAlloc",
    "HeapSys",
    "HeapIdle",
    "HeapInuse",
    "HeapReleased",
    "HeapObjects",
    "StackInuse",
    "StackSys",
    "MSpanInuse",
    "MSpanSys",
    "MCacheInuse",
    "MCacheSys",
    "BuckHashSys",
    "GCSys",
    "OtherSys",
    "NextGC",
    "LastGC",
    "PauseTotalNs",
    "NumGC",
    "NumForcedGC",
    "GCCPUFraction",
    RANDOM_VALUE,
];

/// The full name → kind mapping for this sampler.
pub fn catalogue() -> impl Iterator<Item = (&'static str, MetricKind)> {
    RUNTIME_GAUGES
        .iter()
        .map(|name| (*name, MetricKind::Gauge))
        .chain(std::iter::once((POLL_COUNT, MetricKind::Counter)))
}

pub struct RuntimeSampler {
    system: System,
    pid: Pid,
    store: SampleStore,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().unwrap_or(Pid::from_u32(0));
        Self {
            system: System::new(),
            pid,
            store: SampleStore::new(),
        }
    }

    /// Maps a catalogue name onto the closest process/system statistic.
    fn stat_value(&self, name: &str, rss: f64, virt: f64, total: f64, used: f64) -> f64 {
        match name {
            "Alloc" | "HeapAlloc" | "HeapInuse" | "StackInuse" => rss,
            "TotalAlloc" => rss,
            "Sys" | "HeapSys" => virt,
            "HeapIdle" => (virt - rss).max(0.0),
            "OtherSys" => used,
            "NextGC" => total,
            _ => 0.0,
        }
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for RuntimeSampler {
    fn name(&self) -> &'static str {
        "runtime"
    }

    async fn sample(&mut self) -> Result<(), MetricsError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.refresh_memory();

        let (rss, virt) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory() as f64, p.virtual_memory() as f64))
            .unwrap_or((0.0, 0.0));
        let total = self.system.total_memory() as f64;
        let used = self.system.used_memory() as f64;

        self.store.clear();
        for name in RUNTIME_GAUGES {
            let value = if name == RANDOM_VALUE {
                rand::thread_rng().gen_range(0.0..1_000_000.0)
            } else {
                self.stat_value(name, rss, virt, total, used)
            };
            self.store.append(Metric::new_gauge(name, value));
        }
        self.store.append(Metric::new_counter(POLL_COUNT, 1));

        Ok(())
    }

    fn store(&self) -> &SampleStore {
        &self.store
    }
}
