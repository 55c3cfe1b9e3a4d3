//! Error taxonomy shared by both sides of the pipeline.
//!
//! Every fallible operation in the workspace resolves to one of these
//! classes; transports map them to wire statuses through the central
//! classifiers below instead of inspecting errors ad hoc.

use tonic::Code;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Request contents violate the model: unknown kind, unparsable value,
    /// malformed JSON/protobuf, malformed ciphertext or padding, bad
    /// signature. Never retried.
    #[error("bad data: {0}")]
    BadData(String),

    /// Unknown metric, or the stored kind doesn't match the requested kind.
    #[error("not found: {0}")]
    NotFound(String),

    /// A deadline expired (statement timeout, acquire timeout). Retryable.
    #[error("deadline exceeded: {0}")]
    Timeout(String),

    /// Transient transport-level failure: connection reset, dead database
    /// connection, network I/O error. Retryable.
    #[error("transient: {0}")]
    Transient(String),

    /// The root cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The backend does not implement this operation.
    #[error("{0} is not implemented")]
    Unsupported(&'static str),

    /// Unrecoverable internal state; logged, surfaced as 500.
    #[error("internal: {0}")]
    Internal(String),
}

impl MetricsError {
    /// Predicate used by the retry executor: only transient transport
    /// failures and deadline expiries are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetricsError::Transient(_) | MetricsError::Timeout(_))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            MetricsError::BadData(_) => 400,
            MetricsError::NotFound(_) => 404,
            MetricsError::Timeout(_) => 408,
            _ => 500,
        }
    }

    pub fn grpc_code(&self) -> Code {
        match self {
            MetricsError::BadData(_) => Code::InvalidArgument,
            MetricsError::NotFound(_) => Code::NotFound,
            MetricsError::Timeout(_) => Code::DeadlineExceeded,
            MetricsError::Cancelled => Code::Cancelled,
            MetricsError::Unsupported(_) => Code::Unimplemented,
            _ => Code::Internal,
        }
    }
}

impl From<MetricsError> for tonic::Status {
    fn from(err: MetricsError) -> Self {
        tonic::Status::new(err.grpc_code(), err.to_string())
    }
}
