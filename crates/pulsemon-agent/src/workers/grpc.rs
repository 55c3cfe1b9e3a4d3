//! gRPC report worker.

use async_trait::async_trait;
use prost::Message;
use pulsemon_codec::pipeline::Pipeline;
use pulsemon_common::convert;
use pulsemon_common::error::MetricsError;
use pulsemon_common::headers;
use pulsemon_common::proto::metrics_service_client::MetricsServiceClient;
use pulsemon_common::proto::{MetricUpdateRequest, MetricsUpdateRequest};
use tonic::codec::CompressionEncoding;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::metadata::MetadataValue;

use crate::config::AgentConfig;
use crate::workers::{build_pipeline, AgentWorker, ReportEnvelope};

pub struct GrpcWorker {
    client: MetricsServiceClient<Channel>,
    pipeline: Pipeline,
    host_ip: String,
}

impl GrpcWorker {
    pub fn new(config: &AgentConfig, host_ip: String) -> Result<Self, MetricsError> {
        let scheme = if config.tls_configured() { "https" } else { "http" };
        let mut endpoint = Endpoint::from_shared(format!("{scheme}://{}", config.server_address))
            .map_err(|e| MetricsError::Internal(format!("invalid server address: {e}")))?;

        if config.tls_configured() {
            let tls = client_tls(config)?;
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| MetricsError::Internal(format!("failed to setup TLS: {e}")))?;
        }

        let channel = endpoint.connect_lazy();
        let mut client = MetricsServiceClient::new(channel);

        if config.compress_algo == pulsemon_codec::compress::GZIP {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        Ok(Self {
            client,
            pipeline: build_pipeline(config, false)?,
            host_ip,
        })
    }

    fn attach_metadata<T>(
        &self,
        req: &mut tonic::Request<T>,
        signature: Option<&str>,
    ) -> Result<(), MetricsError> {
        if !self.host_ip.is_empty() {
            let value: MetadataValue<_> = self
                .host_ip
                .parse()
                .map_err(|_| MetricsError::Internal("host ip is not valid metadata".into()))?;
            req.metadata_mut().insert(headers::REAL_IP_META, value);
        }
        if let Some(signature) = signature {
            let value: MetadataValue<_> = signature
                .parse()
                .map_err(|_| MetricsError::Internal("signature is not valid metadata".into()))?;
            req.metadata_mut().insert(headers::SIGNATURE_META, value);
        }
        Ok(())
    }
}

fn client_tls(config: &AgentConfig) -> Result<ClientTlsConfig, MetricsError> {
    let read = |path: &str| {
        std::fs::read(path)
            .map_err(|e| MetricsError::Internal(format!("failed to read '{path}': {e}")))
    };
    let ca = read(&config.ca_cert_path)?;
    let cert = read(&config.tls_cert_path)?;
    let key = read(&config.tls_key_path)?;
    Ok(ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(ca))
        .identity(Identity::from_pem(cert, key)))
}

fn wrap_status(status: tonic::Status) -> MetricsError {
    match status.code() {
        tonic::Code::Unavailable => {
            MetricsError::Transient(format!("server unavailable: {}", status.message()))
        }
        tonic::Code::DeadlineExceeded => {
            MetricsError::Timeout(format!("request deadline exceeded: {}", status.message()))
        }
        _ => MetricsError::Internal(format!("grpc request failed: {status}")),
    }
}

#[async_trait]
impl AgentWorker for GrpcWorker {
    async fn report_data(&self, envelope: &ReportEnvelope) -> Result<(), MetricsError> {
        let mut data = match envelope {
            ReportEnvelope::Single(metric) => convert::metric_to_proto(metric).encode_to_vec(),
            ReportEnvelope::Bulk(metrics) => convert::metrics_to_proto(metrics).encode_to_vec(),
        };

        let ctx = self.pipeline.run(&mut data)?;
        let signature = ctx.get(headers::SIGNATURE);

        let mut client = self.client.clone();
        match envelope {
            ReportEnvelope::Single(_) => {
                let mut req = tonic::Request::new(MetricUpdateRequest { data });
                self.attach_metadata(&mut req, signature)?;
                client.update_metric(req).await.map_err(wrap_status)?;
            }
            ReportEnvelope::Bulk(_) => {
                let mut req = tonic::Request::new(MetricsUpdateRequest { data });
                self.attach_metadata(&mut req, signature)?;
                client.update_metrics(req).await.map_err(wrap_status)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_are_retryable() {
        assert!(wrap_status(tonic::Status::unavailable("down")).is_retryable());
        assert!(wrap_status(tonic::Status::deadline_exceeded("slow")).is_retryable());
        assert!(!wrap_status(tonic::Status::invalid_argument("bad")).is_retryable());
    }
}
