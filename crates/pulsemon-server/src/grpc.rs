//! gRPC transport.
//!
//! Update payloads arrive as pipeline-processed bytes: the service decrypts
//! them with the configured private key, verifies the metadata signature
//! against the recovered plaintext, and only then decodes the protobuf
//! message. The subnet filter runs first for every method.

use std::net::IpAddr;
use std::time::Instant;

use prost::Message;
use pulsemon_codec::{crypt, sign};
use pulsemon_common::convert;
use pulsemon_common::error::MetricsError;
use pulsemon_common::headers;
use pulsemon_common::proto;
use pulsemon_common::proto::metrics_service_server::{MetricsService, MetricsServiceServer};
use tokio_util::sync::CancellationToken;
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataMap;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};

use crate::config::ServerConfig;
use crate::state::AppState;

pub struct GrpcMetricsService {
    state: AppState,
}

impl GrpcMetricsService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn check_subnet(&self, metadata: &MetadataMap) -> Result<(), Status> {
        let Some(subnet) = self.state.trusted_subnet else {
            return Ok(());
        };

        let ip_text = metadata
            .get(headers::REAL_IP_META)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let Ok(ip) = ip_text.parse::<IpAddr>() else {
            tracing::debug!(metadata = ip_text, "unable to parse client address");
            return Err(Status::permission_denied(
                "unable to parse client address from metadata",
            ));
        };

        if !subnet.contains(&ip) {
            tracing::debug!(%ip, %subnet, "client address is not in trusted subnet");
            return Err(Status::permission_denied(
                "client address is not in trusted subnet",
            ));
        }

        Ok(())
    }

    /// Runs the inbound half of the codec pipeline over an update payload:
    /// decrypt, then verify the signature against the plaintext.
    fn process_inbound(
        &self,
        metadata: &MetadataMap,
        mut data: Vec<u8>,
    ) -> Result<Vec<u8>, Status> {
        if let Some(private_key) = &self.state.private_key {
            crypt::decrypt_body(&mut data, private_key)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
        }

        if let Some(secret) = &self.state.secret_key {
            if let Some(signature) = metadata
                .get(headers::SIGNATURE_META)
                .and_then(|v| v.to_str().ok())
            {
                sign::check_data(&data, secret, signature)
                    .map_err(|e| Status::invalid_argument(e.to_string()))?;
            }
        }

        Ok(data)
    }
}

#[tonic::async_trait]
impl MetricsService for GrpcMetricsService {
    async fn get_metric(
        &self,
        request: Request<proto::MetricRequest>,
    ) -> Result<Response<proto::Metric>, Status> {
        let start = Instant::now();
        self.check_subnet(request.metadata())?;

        let req = request.into_inner();
        let metric = self
            .state
            .service
            .get_metric(&req.id, &req.mtype)
            .await
            .map_err(|e| {
                tracing::debug!(id = %req.id, mtype = %req.mtype, error = %e, "failed to get metric");
                Status::from(e)
            })?;

        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "GetMetric handled");
        Ok(Response::new(convert::metric_to_proto(&metric)))
    }

    async fn update_metric(
        &self,
        request: Request<proto::MetricUpdateRequest>,
    ) -> Result<Response<proto::Metric>, Status> {
        let start = Instant::now();
        self.check_subnet(request.metadata())?;

        let (metadata, inner) = (request.metadata().clone(), request.into_inner());
        let data = self.process_inbound(&metadata, inner.data)?;
        let decoded = proto::Metric::decode(data.as_slice())
            .map_err(|e| Status::invalid_argument(format!("invalid metric payload: {e}")))?;
        let metric = convert::metric_from_proto(&decoded).map_err(Status::from)?;

        let updated = self
            .state
            .service
            .update_metric(&metric.kind().to_string(), &metric.id, &metric.value_text())
            .await
            .map_err(|e| {
                tracing::debug!(id = %metric.id, error = %e, "failed to update metric");
                Status::from(e)
            })?;

        self.state.save_sync();
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "UpdateMetric handled");
        Ok(Response::new(convert::metric_to_proto(&updated)))
    }

    async fn update_metrics(
        &self,
        request: Request<proto::MetricsUpdateRequest>,
    ) -> Result<Response<proto::Metrics>, Status> {
        let start = Instant::now();
        self.check_subnet(request.metadata())?;

        let (metadata, inner) = (request.metadata().clone(), request.into_inner());
        let data = self.process_inbound(&metadata, inner.data)?;
        let decoded = proto::Metrics::decode(data.as_slice())
            .map_err(|e| Status::invalid_argument(format!("invalid metrics payload: {e}")))?;
        let metrics = convert::metrics_from_proto(&decoded).map_err(Status::from)?;

        let updated = self
            .state
            .service
            .update_metrics(metrics)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "failed to update metrics");
                Status::from(e)
            })?;

        self.state.save_sync();
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "UpdateMetrics handled");
        Ok(Response::new(convert::metrics_to_proto(&updated)))
    }

    async fn get_all_metrics(
        &self,
        request: Request<proto::Empty>,
    ) -> Result<Response<proto::Metrics>, Status> {
        let start = Instant::now();
        self.check_subnet(request.metadata())?;

        let metrics = self.state.service.get_all_metrics().await.map_err(|e| {
            tracing::debug!(error = %e, "failed to get metrics");
            Status::from(e)
        })?;

        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "GetAllMetrics handled");
        Ok(Response::new(convert::metrics_to_proto(&metrics)))
    }
}

/// Serves the gRPC transport until the token fires; in-flight RPCs drain
/// through tonic's graceful shutdown.
pub async fn serve(
    state: AppState,
    config: &ServerConfig,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = tokio::net::lookup_host(&config.server_address)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("cannot resolve address '{}'", config.server_address))?;

    let mut builder = Server::builder();

    if config.tls_configured() {
        let ca = std::fs::read(&config.ca_cert_path)?;
        let cert = std::fs::read(&config.tls_cert_path)?;
        let key = std::fs::read(&config.tls_key_path)?;
        let tls = ServerTlsConfig::new()
            .identity(Identity::from_pem(cert, key))
            .client_ca_root(Certificate::from_pem(ca));
        builder = builder.tls_config(tls)?;
    }

    let service = MetricsServiceServer::new(GrpcMetricsService::new(state))
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Gzip)
        .max_decoding_message_size(config.max_body_size);

    tracing::info!(%addr, "grpc server listening");

    builder
        .add_service(service)
        .serve_with_shutdown(addr, token.cancelled_owned())
        .await?;

    Ok(())
}
