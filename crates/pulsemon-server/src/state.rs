//! Shared request-handling state.

use std::sync::Arc;

use ipnet::IpNet;
use pulsemon_storage::saver::{FileSaver, Saver};
use rsa::RsaPrivateKey;

use crate::service::MetricsService;

#[derive(Clone)]
pub struct AppState {
    pub service: MetricsService,
    /// Present only in synchronous-save mode (`store_interval == 0`):
    /// mutating handlers persist the snapshot after every write.
    pub sync_saver: Option<Arc<FileSaver>>,
    /// Shared secret for signature verification; `None` disables the check.
    pub secret_key: Option<Vec<u8>>,
    /// RSA private key for body decryption; `None` disables it.
    pub private_key: Option<Arc<RsaPrivateKey>>,
    /// Trusted CIDR for mutating requests; `None` disables the ACL.
    pub trusted_subnet: Option<IpNet>,
}

impl AppState {
    pub fn new(service: MetricsService) -> Self {
        Self {
            service,
            sync_saver: None,
            secret_key: None,
            private_key: None,
            trusted_subnet: None,
        }
    }

    /// Persists the snapshot when running in synchronous-save mode.
    pub fn save_sync(&self) {
        if let Some(saver) = &self.sync_saver {
            if let Err(e) = saver.save() {
                tracing::error!(error = %e, "failed to update persistent storage");
            }
        }
    }
}
