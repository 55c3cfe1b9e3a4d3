//! HMAC-SHA-256 payload signing.

use hmac::{Hmac, Mac};
use pulsemon_common::error::MetricsError;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs `data` with `key` and returns the hex digest.
pub fn sign_data(data: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the hex `signature` over `data`. The comparison is value-based
/// and constant-time on the decoded digest bytes.
pub fn check_data(data: &[u8], key: &[u8], signature: &str) -> Result<(), MetricsError> {
    let expected = hex::decode(signature)
        .map_err(|_| MetricsError::BadData("signature is not valid hex".into()))?;
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.verify_slice(&expected)
        .map_err(|_| MetricsError::BadData("signature is invalid".into()))
}
