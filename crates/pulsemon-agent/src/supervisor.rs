//! Agent core: sampling/report timers, bounded hand-off queue, and the
//! sender worker pool.
//!
//! Each sampler runs in its own task that wakes on two independent timers.
//! Reports are queued onto a bounded channel whose capacity equals the
//! worker count, so producers stall at the first unresponsive worker instead
//! of buffering unboundedly. A single cancellation token drives shutdown for
//! every task.

use std::sync::Arc;
use std::time::Duration;

use pulsemon_collector::Sampler;
use pulsemon_common::retry::RetryPolicy;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::workers::{AgentWorker, ReportEnvelope};

const SEND_RETRY_DELAY: Duration = Duration::from_secs(2);
const SEND_RETRIES: u32 = 3;

pub struct Supervisor {
    poll_interval: Duration,
    report_interval: Duration,
    rate_limit: usize,
}

impl Supervisor {
    pub fn new(poll_interval: Duration, report_interval: Duration, rate_limit: usize) -> Self {
        Self {
            poll_interval,
            report_interval,
            rate_limit: rate_limit.max(1),
        }
    }

    /// Runs sampling and reporting until the token fires, then waits for all
    /// tasks to wind down.
    pub async fn run(
        &self,
        samplers: Vec<Box<dyn Sampler>>,
        worker: Arc<dyn AgentWorker>,
        token: CancellationToken,
    ) {
        let (tx, rx) = mpsc::channel::<ReportEnvelope>(self.rate_limit);
        let rx = Arc::new(Mutex::new(rx));

        let mut tasks = Vec::new();

        for sampler in samplers {
            tasks.push(tokio::spawn(sampler_loop(
                sampler,
                tx.clone(),
                self.poll_interval,
                self.report_interval,
                token.clone(),
            )));
        }
        // Workers observe channel closure once every producer is gone.
        drop(tx);

        for id in 0..self.rate_limit {
            tasks.push(tokio::spawn(sender_loop(
                id,
                rx.clone(),
                worker.clone(),
                token.clone(),
            )));
        }

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "agent task panicked");
            }
        }
    }
}

async fn sampler_loop(
    mut sampler: Box<dyn Sampler>,
    tx: mpsc::Sender<ReportEnvelope>,
    poll_interval: Duration,
    report_interval: Duration,
    token: CancellationToken,
) {
    let mut poll_tick = tokio::time::interval(poll_interval);
    let mut report_tick = tokio::time::interval(report_interval);
    // The immediate first report would ship an empty snapshot.
    report_tick.reset();

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                if let Err(e) = sampler.sample().await {
                    tracing::warn!(sampler = sampler.name(), error = %e, "failed to gather metrics");
                }
            }
            _ = report_tick.tick() => {
                let snapshot = sampler.store().snapshot();
                enqueue_report(snapshot, &tx, &token).await;
            }
            _ = token.cancelled() => {
                tracing::info!(sampler = sampler.name(), "sampler worker exited");
                return;
            }
        }
    }
}

/// Enqueues one bulk envelope followed by one single envelope per metric.
async fn enqueue_report(
    snapshot: Vec<pulsemon_common::metric::Metric>,
    tx: &mpsc::Sender<ReportEnvelope>,
    token: &CancellationToken,
) {
    if snapshot.is_empty() {
        return;
    }

    let singles = snapshot.clone();
    tokio::select! {
        res = tx.send(ReportEnvelope::Bulk(snapshot)) => {
            if res.is_err() {
                return;
            }
        }
        _ = token.cancelled() => return,
    }

    for metric in singles {
        tokio::select! {
            res = tx.send(ReportEnvelope::Single(metric)) => {
                if res.is_err() {
                    return;
                }
            }
            _ = token.cancelled() => return,
        }
    }
}

async fn sender_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ReportEnvelope>>>,
    worker: Arc<dyn AgentWorker>,
    token: CancellationToken,
) {
    let retry = RetryPolicy::new(SEND_RETRY_DELAY, SEND_RETRIES, token.clone());
    loop {
        let envelope = tokio::select! {
            envelope = async { rx.lock().await.recv().await } => {
                match envelope {
                    Some(envelope) => envelope,
                    None => return,
                }
            }
            _ = token.cancelled() => {
                tracing::info!(worker = id, "sender worker exited");
                return;
            }
        };

        tokio::select! {
            res = retry.retry(|| worker.report_data(&envelope)) => {
                if let Err(e) = res {
                    tracing::error!(worker = id, error = %e, "failed to report metrics");
                }
            }
            _ = token.cancelled() => {
                tracing::info!(worker = id, "sender worker exited mid-send");
                return;
            }
        }
    }
}
