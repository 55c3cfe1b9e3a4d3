//! In-memory repository.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::RwLock;

use async_trait::async_trait;
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::{Metric, MetricKind};

use crate::Repository;

/// Map of metrics behind a reader/writer lock. The workload is read-mostly:
/// every report cycle reads all metrics once and writes a handful.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> MetricsError {
        MetricsError::Internal("metrics lock poisoned".into())
    }

    /// Applies update semantics under an already-held write lock. An upsert
    /// that changes a metric's kind replaces the stored entry.
    fn apply(map: &mut HashMap<String, Metric>, incoming: Metric) -> Metric {
        match map.get_mut(&incoming.id) {
            Some(existing) if existing.kind() == incoming.kind() => {
                existing
                    .merge(&incoming)
                    .expect("kinds checked before merge");
                existing.clone()
            }
            _ => {
                map.insert(incoming.id.clone(), incoming.clone());
                incoming
            }
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get(&self, id: &str, kind: MetricKind) -> Result<Metric, MetricsError> {
        let metrics = self.metrics.read().map_err(|_| Self::lock_err())?;
        match metrics.get(id) {
            Some(m) if m.kind() == kind => Ok(m.clone()),
            _ => Err(MetricsError::NotFound(format!(
                "metric '{id}' of type '{kind}' not found"
            ))),
        }
    }

    async fn upsert(
        &self,
        id: &str,
        value: &str,
        kind: MetricKind,
    ) -> Result<String, MetricsError> {
        let incoming = Metric::parse(id, value, &kind.to_string())?;
        let mut metrics = self.metrics.write().map_err(|_| Self::lock_err())?;
        let stored = Self::apply(&mut metrics, incoming);
        Ok(stored.value_text())
    }

    async fn upsert_bulk(&self, incoming: Vec<Metric>) -> Result<Vec<Metric>, MetricsError> {
        let mut metrics = self.metrics.write().map_err(|_| Self::lock_err())?;
        let mut updated = Vec::with_capacity(incoming.len());
        for m in incoming {
            updated.push(Self::apply(&mut metrics, m));
        }
        Ok(updated)
    }

    async fn get_all(&self) -> Result<Vec<Metric>, MetricsError> {
        let metrics = self.metrics.read().map_err(|_| Self::lock_err())?;
        let mut all: Vec<Metric> = metrics.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<(), MetricsError> {
        let mut metrics = self.metrics.write().map_err(|_| Self::lock_err())?;
        metrics.remove(id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn save(&self, w: &mut dyn Write) -> Result<(), MetricsError> {
        let metrics = self.metrics.read().map_err(|_| Self::lock_err())?;
        let mut all: Vec<&Metric> = metrics.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        serde_json::to_writer(w, &all)
            .map_err(|e| MetricsError::Internal(format!("failed to save metrics: {e}")))
    }

    fn load(&self, r: &mut dyn Read) -> Result<(), MetricsError> {
        let loaded: Vec<Metric> = serde_json::from_reader(r)
            .map_err(|e| MetricsError::BadData(format!("failed to load metrics: {e}")))?;
        let mut metrics = self.metrics.write().map_err(|_| Self::lock_err())?;
        for m in loaded {
            metrics.insert(m.id.clone(), m);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}
