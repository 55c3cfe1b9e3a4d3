//! Snapshot persistence: synchronous file saver and periodic background
//! saver with a shutdown flush.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pulsemon_common::error::MetricsError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Repository;

/// Anything that can persist a snapshot on demand.
pub trait Saver: Send + Sync {
    fn save(&self) -> Result<(), MetricsError>;
}

/// Writes repository snapshots to a file. Each save truncates, writes, and
/// fsyncs, so a reader that opens after close never sees a partial write.
pub struct FileSaver {
    path: PathBuf,
    repo: Arc<dyn Repository>,
}

impl FileSaver {
    pub fn new(path: impl Into<PathBuf>, repo: Arc<dyn Repository>) -> Self {
        Self {
            path: path.into(),
            repo,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restores the repository from the snapshot file, if it exists.
    pub fn restore(&self) -> Result<(), MetricsError> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(MetricsError::Internal(format!(
                    "failed to open snapshot '{}': {e}",
                    self.path.display()
                )))
            }
        };
        self.repo.load(&mut file)
    }
}

impl Saver for FileSaver {
    fn save(&self) -> Result<(), MetricsError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| {
                MetricsError::Internal(format!(
                    "failed to open snapshot '{}': {e}",
                    self.path.display()
                ))
            })?;
        self.repo.save(&mut file)?;
        file.sync_all().map_err(|e| {
            MetricsError::Internal(format!(
                "failed to sync snapshot '{}': {e}",
                self.path.display()
            ))
        })
    }
}

/// Background task that saves on a fixed period and performs exactly one
/// final save when stopped, regardless of tick phase.
pub struct PeriodicSaver {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicSaver {
    pub fn start(saver: Arc<dyn Saver>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut tick = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = saver.save() {
                            tracing::error!(error = %e, "saving data before exit failed");
                        }
                        return;
                    }
                    _ = tick.tick() => {
                        if let Err(e) = saver.save() {
                            tracing::error!(error = %e, "saving data failed");
                        }
                    }
                }
            }
        });
        Self { shutdown, handle }
    }

    /// Signals shutdown and waits for the final save to complete.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "periodic saver task failed");
        }
    }
}
