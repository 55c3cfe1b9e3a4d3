//! Metrics service: validation and dispatch to the repository.

use std::sync::Arc;

use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::{Metric, MetricKind};
use pulsemon_storage::Repository;

#[derive(Clone)]
pub struct MetricsService {
    repo: Arc<dyn Repository>,
}

impl MetricsService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub async fn health_check(&self) -> Result<(), MetricsError> {
        self.repo.health_check().await
    }

    pub async fn get_metric(&self, id: &str, kind_tag: &str) -> Result<Metric, MetricsError> {
        let kind: MetricKind = kind_tag.parse()?;
        self.repo.get(id, kind).await
    }

    /// Validates and applies one update, returning the metric as stored
    /// after the write.
    pub async fn update_metric(
        &self,
        kind_tag: &str,
        id: &str,
        value: &str,
    ) -> Result<Metric, MetricsError> {
        if id.is_empty() {
            return Err(MetricsError::BadData("metric id must not be empty".into()));
        }
        let kind: MetricKind = kind_tag.parse()?;
        let updated = self.repo.upsert(id, value, kind).await?;
        Metric::parse(id, &updated, kind_tag)
    }

    /// Applies a batch of updates and returns the post-write snapshot of the
    /// affected metrics in input order.
    pub async fn update_metrics(
        &self,
        metrics: Vec<Metric>,
    ) -> Result<Vec<Metric>, MetricsError> {
        if metrics.iter().any(|m| m.id.is_empty()) {
            return Err(MetricsError::BadData("metric id must not be empty".into()));
        }
        self.repo.upsert_bulk(metrics).await
    }

    pub async fn get_all_metrics(&self) -> Result<Vec<Metric>, MetricsError> {
        self.repo.get_all().await
    }
}
