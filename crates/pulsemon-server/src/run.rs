//! Server assembly and lifecycle.
//!
//! One root cancellation token drives shutdown. The transport task and the
//! teardown task run as a group: the transport serves until the token fires
//! (or fails on its own, which also cancels the token), then teardown stops
//! the periodic saver and closes the repository.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pulsemon_common::retry::RetryPolicy;
use pulsemon_storage::memory::MemoryRepository;
use pulsemon_storage::postgres::PgRepository;
use pulsemon_storage::saver::{FileSaver, PeriodicSaver};
use pulsemon_storage::Repository;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::service::MetricsService;
use crate::state::AppState;
use crate::{app, grpc};

/// Cancels `token` when the process receives SIGINT, SIGTERM, or SIGQUIT.
pub fn spawn_signal_task(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("server is stopping");
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

/// Builds the request-handling state from the config.
pub fn build_state(
    config: &ServerConfig,
    repo: Arc<dyn Repository>,
    sync_saver: Option<Arc<FileSaver>>,
) -> Result<AppState> {
    let mut state = AppState::new(MetricsService::new(repo));
    state.sync_saver = sync_saver;

    if !config.secret_key.is_empty() {
        state.secret_key = Some(config.secret_key.clone().into_bytes());
    }

    if !config.crypto_key.is_empty() {
        let key = pulsemon_codec::crypt::load_private_key(&config.crypto_key)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        state.private_key = Some(Arc::new(key));
    }

    if !config.trusted_subnet.is_empty() {
        let subnet = config
            .trusted_subnet
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid trusted subnet: {e}"))?;
        state.trusted_subnet = Some(subnet);
    }

    Ok(state)
}

pub async fn run(config: ServerConfig) -> Result<()> {
    tracing::info!(
        address = %config.server_address,
        mode = %config.work_mode,
        store_file = %config.store_file,
        store_interval = config.store_interval_secs,
        restore = config.restore,
        database = !config.database_dsn.is_empty(),
        subnet = %config.trusted_subnet,
        "server starting"
    );

    let token = CancellationToken::new();
    spawn_signal_task(token.clone());

    let retry = RetryPolicy::new(
        Duration::from_secs(config.retry_delay_secs),
        config.retry_count,
        token.clone(),
    );

    let use_database = !config.database_dsn.is_empty();
    let repo: Arc<dyn Repository> = if use_database {
        Arc::new(
            PgRepository::connect(
                &config.database_dsn,
                Duration::from_secs(config.ping_timeout_secs),
                retry,
            )
            .await
            .map_err(|e| anyhow::anyhow!("failed to create metrics storage: {e}"))?,
        )
    } else {
        Arc::new(MemoryRepository::new())
    };

    // File persistence applies only to the in-memory backend; a configured
    // database DSN overrides it.
    let mut periodic_saver = None;
    let mut sync_saver = None;
    if !config.store_file.is_empty() && !use_database {
        let file_saver = Arc::new(FileSaver::new(&config.store_file, repo.clone()));

        if config.restore {
            match file_saver.restore() {
                Ok(()) => {
                    tracing::info!(file = %config.store_file, "restored metrics from snapshot")
                }
                Err(e) => {
                    tracing::error!(file = %config.store_file, error = %e, "failed to restore metrics")
                }
            }
        }

        if config.store_interval_secs > 0 {
            periodic_saver = Some(PeriodicSaver::start(
                file_saver,
                Duration::from_secs(config.store_interval_secs),
            ));
            tracing::info!("async snapshot saver started");
        } else {
            sync_saver = Some(file_saver);
            tracing::info!("snapshots will be written synchronously");
        }
    }

    let state = build_state(&config, repo.clone(), sync_saver)?;

    // Transport task: serving until the token fires. A transport failure
    // also cancels the token so teardown always runs.
    let serve = {
        let token = token.clone();
        let config = config.clone();
        let state = state.clone();
        async move {
            let result = match config.work_mode.as_str() {
                "http" => serve_http(state, &config, token.clone()).await,
                "grpc" => grpc::serve(state, &config, token.clone()).await,
                other => Err(anyhow::anyhow!("unknown work mode: {other}")),
            };
            token.cancel();
            result
        }
    };

    // Teardown task: waits for shutdown, then flushes the saver and closes
    // the repository.
    let teardown = {
        let token = token.clone();
        async move {
            token.cancelled().await;
            if let Some(saver) = periodic_saver {
                saver.stop().await;
            }
            if let Err(e) = repo.close().await {
                tracing::error!(error = %e, "failed to close metrics storage");
            }
            Ok::<(), anyhow::Error>(())
        }
    };

    tokio::try_join!(serve, teardown)?;

    tracing::info!("server stopped");
    Ok(())
}

async fn serve_http(
    state: AppState,
    config: &ServerConfig,
    token: CancellationToken,
) -> Result<()> {
    let app = app::build_router(state, config.max_body_size);
    let listener = tokio::net::TcpListener::bind(&config.server_address).await?;
    tracing::info!(address = %config.server_address, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}
