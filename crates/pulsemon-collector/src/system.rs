//! Host memory and CPU sampler.

use std::time::Duration;

use async_trait::async_trait;
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::Metric;
use sysinfo::System;

use crate::store::SampleStore;
use crate::Sampler;

pub const TOTAL_MEMORY: &str = "TotalMemory";
pub const FREE_MEMORY: &str = "FreeMemory";
pub const CPU_UTILIZATION: &str = "CPUutilization";

/// Window over which per-CPU utilization is measured.
const CPU_USAGE_WINDOW: Duration = Duration::from_millis(100);

pub struct SystemSampler {
    system: System,
    store: SampleStore,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            store: SampleStore::new(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn sample(&mut self) -> Result<(), MetricsError> {
        self.system.refresh_memory();

        // Two refreshes bracket the measurement window; usage is the delta.
        self.system.refresh_cpu_all();
        tokio::time::sleep(CPU_USAGE_WINDOW).await;
        self.system.refresh_cpu_all();

        self.store.clear();
        self.store.append(Metric::new_gauge(
            TOTAL_MEMORY,
            self.system.total_memory() as f64,
        ));
        self.store.append(Metric::new_gauge(
            FREE_MEMORY,
            self.system.available_memory() as f64,
        ));

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            self.store.append(Metric::new_gauge(
                format!("{}{}", CPU_UTILIZATION, i + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }

        Ok(())
    }

    fn store(&self) -> &SampleStore {
        &self.store
    }
}
