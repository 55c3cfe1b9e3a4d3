//! Agent assembly and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pulsemon_collector::runtime::RuntimeSampler;
use pulsemon_collector::system::SystemSampler;
use pulsemon_collector::Sampler;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::net;
use crate::supervisor::Supervisor;
use crate::workers::grpc::GrpcWorker;
use crate::workers::http::HttpWorker;
use crate::workers::AgentWorker;

/// Cancels `token` when the process receives SIGINT, SIGTERM, or SIGQUIT.
pub fn spawn_signal_task(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("agent is stopping");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGQUIT handler");
            return;
        }
    };
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Builds every component from the config and runs the supervisor until a
/// shutdown signal arrives.
pub async fn run(config: AgentConfig) -> Result<()> {
    tracing::info!(
        server = %config.server_address,
        client = %config.client_mode,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        compress = %config.compress_algo,
        signing = !config.secret_key.is_empty(),
        encryption = !config.crypto_key.is_empty(),
        "agent starting"
    );

    let host_ip = net::host_ip_for(&config.server_address);

    let worker: Arc<dyn AgentWorker> = match config.client_mode.as_str() {
        "http" => Arc::new(HttpWorker::new(&config, host_ip)?),
        "grpc" => Arc::new(GrpcWorker::new(&config, host_ip)?),
        other => anyhow::bail!("unknown client mode: {other}"),
    };

    let samplers: Vec<Box<dyn Sampler>> = vec![
        Box::new(RuntimeSampler::new()),
        Box::new(SystemSampler::new()),
    ];

    let token = CancellationToken::new();
    spawn_signal_task(token.clone());

    let supervisor = Supervisor::new(
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.report_interval_secs),
        config.rate_limit,
    );
    supervisor.run(samplers, worker, token).await;

    tracing::info!("agent stopped");
    Ok(())
}
