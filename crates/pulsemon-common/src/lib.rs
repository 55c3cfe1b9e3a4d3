pub mod convert;
pub mod error;
pub mod metric;
pub mod retry;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("pulsemon");
}

/// Header / gRPC-metadata names shared between agent and server.
pub mod headers {
    /// Hex HMAC-SHA-256 of the plaintext payload.
    pub const SIGNATURE: &str = "HashSHA256";
    /// Originating host address, checked against the trusted subnet.
    pub const REAL_IP: &str = "X-Real-IP";
    /// Compression algorithm applied to the payload.
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    /// Lowercase forms used as gRPC metadata keys.
    pub const SIGNATURE_META: &str = "hashsha256";
    pub const REAL_IP_META: &str = "x-real-ip";
}
