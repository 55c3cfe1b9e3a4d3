//! HTTP report worker.

use std::time::Duration;

use async_trait::async_trait;
use pulsemon_codec::pipeline::Pipeline;
use pulsemon_common::error::MetricsError;
use pulsemon_common::headers;

use crate::config::AgentConfig;
use crate::workers::{build_pipeline, AgentWorker, ReportEnvelope};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpWorker {
    client: reqwest::Client,
    pipeline: Pipeline,
    report_endpoint: String,
    report_bulk_endpoint: String,
    host_ip: String,
}

impl HttpWorker {
    pub fn new(config: &AgentConfig, host_ip: String) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| MetricsError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            pipeline: build_pipeline(config, true)?,
            report_endpoint: config.report_endpoint(),
            report_bulk_endpoint: config.report_bulk_endpoint(),
            host_ip,
        })
    }
}

#[async_trait]
impl AgentWorker for HttpWorker {
    async fn report_data(&self, envelope: &ReportEnvelope) -> Result<(), MetricsError> {
        let (url, mut body) = match envelope {
            ReportEnvelope::Single(metric) => (
                &self.report_endpoint,
                serde_json::to_vec(metric).map_err(|e| {
                    MetricsError::Internal(format!("failed to encode metric to JSON: {e}"))
                })?,
            ),
            ReportEnvelope::Bulk(metrics) => (
                &self.report_bulk_endpoint,
                serde_json::to_vec(metrics).map_err(|e| {
                    MetricsError::Internal(format!("failed to encode metrics to JSON: {e}"))
                })?,
            ),
        };

        let ctx = self.pipeline.run(&mut body)?;

        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(headers::REAL_IP, self.host_ip.as_str())
            .body(body);

        if let Some(encoding) = ctx.get(headers::CONTENT_ENCODING) {
            req = req.header(headers::CONTENT_ENCODING, encoding);
        }
        if let Some(signature) = ctx.get(headers::SIGNATURE) {
            req = req.header(headers::SIGNATURE, signature);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| MetricsError::Transient(format!("failed to send metrics: {e}")))?;

        let status = resp.status();
        // Drain the body so the connection can be reused.
        let _ = resp.bytes().await;

        if !status.is_success() {
            return Err(MetricsError::Internal(format!(
                "failed to send metrics, status code: {status}"
            )));
        }

        Ok(())
    }
}
