//! Gzip payload compression.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pulsemon_common::error::MetricsError;

/// The only compression algorithm currently supported.
pub const GZIP: &str = "gzip";

pub fn is_supported(algo: &str) -> bool {
    algo == GZIP
}

/// Compresses `data` with gzip at best-speed level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, MetricsError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::fast());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| MetricsError::Internal(format!("failed to compress data: {e}")))
}

/// Decompresses a gzip payload. Malformed input is a bad-data error.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, MetricsError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MetricsError::BadData(format!("failed to decompress data: {e}")))?;
    Ok(out)
}
