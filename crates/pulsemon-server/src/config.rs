//! Server configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (`host:port`).
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Serving transport: `http` or `grpc`.
    #[serde(default = "default_work_mode")]
    pub work_mode: String,
    /// Snapshot file path; empty disables file persistence.
    #[serde(default)]
    pub store_file: String,
    /// Snapshot period in seconds. Zero switches to synchronous saves after
    /// every mutating request.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Restore the repository from the snapshot file on startup.
    #[serde(default)]
    pub restore: bool,
    /// PostgreSQL DSN; non-empty selects the relational backend and
    /// overrides file persistence.
    #[serde(default)]
    pub database_dsn: String,
    /// Shared secret for signature checking; empty disables it.
    #[serde(default)]
    pub secret_key: String,
    /// Path to the RSA private key PEM; empty disables body decryption.
    #[serde(default)]
    pub crypto_key: String,
    /// Trusted CIDR for mutating requests; empty disables the ACL.
    #[serde(default)]
    pub trusted_subnet: String,
    /// Maximum accepted request body size, bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Per-statement deadline for the relational backend, seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// Base delay between retry attempts, seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Max retry attempts for retryable repository errors.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Mutual-TLS material for the gRPC transport; all three must be set to
    /// enable TLS.
    #[serde(default)]
    pub ca_cert_path: String,
    #[serde(default)]
    pub tls_cert_path: String,
    #[serde(default)]
    pub tls_key_path: String,
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}

fn default_work_mode() -> String {
    "http".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_ping_timeout() -> u64 {
    5
}

fn default_retry_delay() -> u64 {
    1
}

fn default_retry_count() -> u32 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults deserialize from empty document")
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads the config file when present, otherwise starts from defaults;
    /// recognised environment variables override either way.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Applies the environment-variable contract.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ADDRESS") {
            self.server_address = v;
        }
        if let Ok(v) = std::env::var("STORE_INTERVAL") {
            if let Ok(secs) = v.parse() {
                self.store_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("FILE_STORAGE_PATH") {
            self.store_file = v;
        }
        if let Ok(v) = std::env::var("RESTORE") {
            if let Ok(restore) = v.parse() {
                self.restore = restore;
            }
        }
        if let Ok(v) = std::env::var("DATABASE_DSN") {
            self.database_dsn = v;
        }
        if let Ok(v) = std::env::var("KEY") {
            self.secret_key = v;
        }
        if let Ok(v) = std::env::var("CRYPTO_KEY") {
            self.crypto_key = v;
        }
        if let Ok(v) = std::env::var("TRUSTED_SUBNET") {
            self.trusted_subnet = v;
        }
    }

    pub fn tls_configured(&self) -> bool {
        !self.ca_cert_path.is_empty()
            && !self.tls_cert_path.is_empty()
            && !self.tls_key_path.is_empty()
    }
}
