//! Outbound request pipeline.
//!
//! A stage mutates the byte buffer in place and may publish out-of-band
//! values (signature hex, content-encoding tag) into the pipeline context.
//! Stages run in a fixed order: sign first so the signature covers the
//! plaintext, then encrypt, then compress. The server applies the inverse
//! chain (decompress, decrypt, check signature) as middleware.

use std::collections::HashMap;

use pulsemon_common::error::MetricsError;
use pulsemon_common::headers;
use rsa::RsaPublicKey;

use crate::{compress, sign};

/// Per-request side channel carrying values produced by pipeline stages.
#[derive(Debug, Default)]
pub struct PipelineContext {
    values: HashMap<&'static str, String>,
}

impl PipelineContext {
    pub fn set(&mut self, key: &'static str, value: String) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub type Stage =
    Box<dyn Fn(&mut PipelineContext, &mut Vec<u8>) -> Result<(), MetricsError> + Send + Sync>;

/// An ordered chain of stages applied to one outbound payload.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Runs every stage over `data`, returning the populated context.
    pub fn run(&self, data: &mut Vec<u8>) -> Result<PipelineContext, MetricsError> {
        let mut ctx = PipelineContext::default();
        for stage in &self.stages {
            stage(&mut ctx, data)?;
        }
        Ok(ctx)
    }
}

/// Stage that signs the current buffer and records the hex digest under the
/// signature header key.
pub fn signature_stage(secret_key: Vec<u8>) -> Stage {
    Box::new(move |ctx, data| {
        let hash = sign::sign_data(data, &secret_key);
        ctx.set(headers::SIGNATURE, hash);
        Ok(())
    })
}

/// Stage that replaces the buffer with the hybrid-encrypted layout.
pub fn encryption_stage(public_key: RsaPublicKey) -> Stage {
    Box::new(move |_ctx, data| crate::crypt::encrypt_body(data, &public_key))
}

/// Stage that gzips the buffer and records the content-encoding tag.
pub fn compression_stage() -> Stage {
    Box::new(move |ctx, data| {
        *data = compress::compress(data)?;
        ctx.set(headers::CONTENT_ENCODING, compress::GZIP.to_string());
        Ok(())
    })
}
