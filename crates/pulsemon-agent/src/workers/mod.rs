//! Report transport workers.
//!
//! Both transports share the outbound codec pipeline; the envelope decides
//! which endpoint/RPC receives the payload.

pub mod grpc;
pub mod http;

use async_trait::async_trait;
use pulsemon_codec::pipeline::{compression_stage, encryption_stage, signature_stage, Pipeline};
use pulsemon_codec::{compress, crypt};
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::Metric;

use crate::config::AgentConfig;

/// Unit of work handed from producers to sender workers.
#[derive(Debug, Clone)]
pub enum ReportEnvelope {
    Single(Metric),
    Bulk(Vec<Metric>),
}

#[async_trait]
pub trait AgentWorker: Send + Sync {
    async fn report_data(&self, envelope: &ReportEnvelope) -> Result<(), MetricsError>;
}

/// Builds the outbound pipeline for a transport. Stage order is fixed:
/// sign (over the plaintext), encrypt, compress. `with_compression` is off
/// for gRPC, which compresses at the transport level instead.
pub fn build_pipeline(
    config: &AgentConfig,
    with_compression: bool,
) -> Result<Pipeline, MetricsError> {
    let mut pipeline = Pipeline::default();

    if !config.secret_key.is_empty() {
        pipeline.push(signature_stage(config.secret_key.clone().into_bytes()));
    }

    if !config.crypto_key.is_empty() {
        let public_key = crypt::load_public_key(&config.crypto_key)?;
        pipeline.push(encryption_stage(public_key));
    }

    if with_compression && !config.compress_algo.is_empty() {
        if compress::is_supported(&config.compress_algo) {
            pipeline.push(compression_stage());
        } else {
            tracing::warn!(
                algo = %config.compress_algo,
                "unsupported compression algorithm, sending uncompressed"
            );
        }
    }

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsemon_common::headers;

    #[test]
    fn pipeline_without_options_is_empty_passthrough() {
        let config = AgentConfig {
            compress_algo: String::new(),
            ..AgentConfig::default()
        };
        let pipeline = build_pipeline(&config, true).unwrap();
        let mut data = b"payload".to_vec();
        let ctx = pipeline.run(&mut data).unwrap();
        assert_eq!(data, b"payload");
        assert!(ctx.get(headers::SIGNATURE).is_none());
        assert!(ctx.get(headers::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn signature_and_compression_stages_populate_context() {
        let config = AgentConfig {
            secret_key: "shared".to_string(),
            ..AgentConfig::default()
        };
        let pipeline = build_pipeline(&config, true).unwrap();
        let plaintext = b"payload".to_vec();
        let mut data = plaintext.clone();
        let ctx = pipeline.run(&mut data).unwrap();

        let sig = ctx.get(headers::SIGNATURE).expect("signature set");
        pulsemon_codec::sign::check_data(&plaintext, b"shared", sig).unwrap();
        assert_eq!(ctx.get(headers::CONTENT_ENCODING), Some("gzip"));
        assert_eq!(compress::decompress(&data).unwrap(), plaintext);
    }

    #[test]
    fn grpc_pipeline_skips_compression() {
        let config = AgentConfig {
            secret_key: "shared".to_string(),
            ..AgentConfig::default()
        };
        let pipeline = build_pipeline(&config, false).unwrap();
        let mut data = b"payload".to_vec();
        let ctx = pipeline.run(&mut data).unwrap();
        assert_eq!(data, b"payload");
        assert!(ctx.get(headers::CONTENT_ENCODING).is_none());
    }
}
