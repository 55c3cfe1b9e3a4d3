//! Server-side metric repositories and snapshot persistence.

pub mod memory;
pub mod postgres;
pub mod saver;

use std::io::{Read, Write};

use async_trait::async_trait;
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::{Metric, MetricKind};

/// Logical mapping `id -> Metric`. Counter upserts accumulate, gauge upserts
/// replace; a `get` only succeeds when the stored kind matches the request.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get(&self, id: &str, kind: MetricKind) -> Result<Metric, MetricsError>;

    /// Parses `value` for `kind`, applies update semantics, and returns the
    /// text form of the stored value after the write.
    async fn upsert(&self, id: &str, value: &str, kind: MetricKind)
        -> Result<String, MetricsError>;

    /// Applies all updates atomically (where the backend supports it) and
    /// returns the post-write snapshot of the affected metrics in input
    /// order.
    async fn upsert_bulk(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>, MetricsError>;

    /// All metrics, sorted by id for stable rendering.
    async fn get_all(&self) -> Result<Vec<Metric>, MetricsError>;

    async fn delete(&self, id: &str) -> Result<(), MetricsError>;

    async fn health_check(&self) -> Result<(), MetricsError>;

    /// Writes a snapshot of the repository. File-backed persistence only;
    /// database-backed repositories return `Unsupported`.
    fn save(&self, w: &mut dyn Write) -> Result<(), MetricsError>;

    /// Restores a snapshot previously written by `save`.
    fn load(&self, r: &mut dyn Read) -> Result<(), MetricsError>;

    async fn close(&self) -> Result<(), MetricsError>;
}
