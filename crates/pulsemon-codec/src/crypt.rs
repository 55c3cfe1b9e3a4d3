//! Hybrid RSA + AES payload encryption.
//!
//! The agent encrypts each request body with a fresh AES-256 key, wraps the
//! key with RSA-OAEP(SHA-256), and emits
//! `BE64(len(encKey)) ‖ encKey ‖ IV(16) ‖ AES-256-CBC-PKCS7(plaintext)`.
//! The server reverses the layout with its private key.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pulsemon_common::error::MetricsError;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const AES_KEY_LEN: usize = 32;
const AES_BLOCK_LEN: usize = 16;
const ENC_KEY_LEN_PREFIX: usize = 8;

/// Loads an RSA public key from a PEM file (PKCS#8/SPKI or PKCS#1 body).
pub fn load_public_key(path: &str) -> Result<RsaPublicKey, MetricsError> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| MetricsError::Internal(format!("failed to read public key '{path}': {e}")))?;
    RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e| MetricsError::Internal(format!("failed to parse public key '{path}': {e}")))
}

/// Loads an RSA private key from a PEM file (PKCS#8 or PKCS#1 body).
pub fn load_private_key(path: &str) -> Result<RsaPrivateKey, MetricsError> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| MetricsError::Internal(format!("failed to read private key '{path}': {e}")))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| MetricsError::Internal(format!("failed to parse private key '{path}': {e}")))
}

fn encrypt_aes(data: &[u8], key: &[u8; AES_KEY_LEN]) -> Result<Vec<u8>, MetricsError> {
    let mut iv = [0u8; AES_BLOCK_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let ct = Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(data);
    let mut out = Vec::with_capacity(AES_BLOCK_LEN + ct.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ct);
    Ok(out)
}

fn decrypt_aes(data: &[u8], key: &[u8]) -> Result<Vec<u8>, MetricsError> {
    if key.len() != AES_KEY_LEN {
        return Err(MetricsError::BadData(format!(
            "invalid symmetric key length: {}",
            key.len()
        )));
    }
    if data.len() < 2 * AES_BLOCK_LEN || data.len() % AES_BLOCK_LEN != 0 {
        return Err(MetricsError::BadData("invalid ciphertext length".into()));
    }
    let (iv, ct) = data.split_at(AES_BLOCK_LEN);
    let key: &[u8; AES_KEY_LEN] = key.try_into().expect("length checked above");
    let iv: &[u8; AES_BLOCK_LEN] = iv.try_into().expect("split at block length");
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ct)
        .map_err(|_| MetricsError::BadData("invalid padding".into()))
}

/// Encrypts a request body for `public_key`, replacing `data` with the
/// hybrid layout described in the module docs.
pub fn encrypt_body(data: &mut Vec<u8>, public_key: &RsaPublicKey) -> Result<(), MetricsError> {
    let mut rng = rand::thread_rng();
    let mut symmetric_key = [0u8; AES_KEY_LEN];
    rng.fill_bytes(&mut symmetric_key);

    let encrypted_key = public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), &symmetric_key)
        .map_err(|e| MetricsError::Internal(format!("failed to wrap symmetric key: {e}")))?;

    let encrypted_data = encrypt_aes(data, &symmetric_key)?;

    data.clear();
    data.extend_from_slice(&(encrypted_key.len() as u64).to_be_bytes());
    data.extend_from_slice(&encrypted_key);
    data.extend_from_slice(&encrypted_data);
    Ok(())
}

/// Decrypts a hybrid-layout body in place with `private_key`.
pub fn decrypt_body(data: &mut Vec<u8>, private_key: &RsaPrivateKey) -> Result<(), MetricsError> {
    if data.len() < ENC_KEY_LEN_PREFIX {
        return Err(MetricsError::BadData(format!(
            "encrypted body is too small: {}",
            data.len()
        )));
    }

    let key_len_bytes: [u8; ENC_KEY_LEN_PREFIX] =
        data[..ENC_KEY_LEN_PREFIX].try_into().expect("length checked");
    let key_len = u64::from_be_bytes(key_len_bytes) as usize;

    if key_len >= data.len() - ENC_KEY_LEN_PREFIX {
        return Err(MetricsError::BadData(format!(
            "invalid symmetric key size: {key_len}"
        )));
    }

    let encrypted_key = &data[ENC_KEY_LEN_PREFIX..ENC_KEY_LEN_PREFIX + key_len];
    let encrypted_data = &data[ENC_KEY_LEN_PREFIX + key_len..];

    let symmetric_key = private_key
        .decrypt(Oaep::new::<Sha256>(), encrypted_key)
        .map_err(|_| MetricsError::BadData("failed to unwrap symmetric key".into()))?;

    let plaintext = decrypt_aes(encrypted_data, &symmetric_key)?;
    *data = plaintext;
    Ok(())
}
