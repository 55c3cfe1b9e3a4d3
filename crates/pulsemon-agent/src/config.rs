//! Agent configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Metrics server address (`host:port`).
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Server path for single-metric reports.
    #[serde(default = "default_report_url")]
    pub report_url: String,
    /// Server path for bulk reports.
    #[serde(default = "default_report_bulk_url")]
    pub report_bulk_url: String,
    /// Metrics polling interval, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Metrics report interval, seconds.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of concurrent sender workers; also the report queue capacity.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Compression algorithm for report payloads (`gzip` or empty).
    #[serde(default = "default_compress_algo")]
    pub compress_algo: String,
    /// Shared secret for HMAC signing; empty disables signing.
    #[serde(default)]
    pub secret_key: String,
    /// Path to the server's RSA public key PEM; empty disables encryption.
    #[serde(default)]
    pub crypto_key: String,
    /// Report transport: `http` or `grpc`.
    #[serde(default = "default_client_mode")]
    pub client_mode: String,
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

fn default_report_url() -> String {
    "/update".to_string()
}

fn default_report_bulk_url() -> String {
    "/updates".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    20
}

fn default_compress_algo() -> String {
    "gzip".to_string()
}

fn default_client_mode() -> String {
    "http".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults deserialize from empty document")
    }
}

impl AgentConfig {
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
        if let Ok(v) = std::env::var("POLL_INTERVAL") {
            if let Ok(secs) = v.parse() {
                self.poll_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("REPORT_INTERVAL") {
            if let Ok(secs) = v.parse() {
                self.report_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT") {
            if let Ok(limit) = v.parse() {
                self.rate_limit = limit;
            }
        }
        if let Ok(v) = std::env::var("KEY") {
            self.secret_key = v;
        }
        if let Ok(v) = std::env::var("CRYPTO_KEY") {
            self.crypto_key = v;
        }
    }

    /// Full endpoint URL for single-metric reports.
    pub fn report_endpoint(&self) -> String {
        build_endpoint(&self.server_address, &self.report_url)
    }

    /// Full endpoint URL for bulk reports.
    pub fn report_bulk_endpoint(&self) -> String {
        build_endpoint(&self.server_address, &self.report_bulk_url)
    }

    pub fn tls_configured(&self) -> bool {
        !self.ca_cert_path.is_empty()
            && !self.tls_cert_path.is_empty()
            && !self.tls_key_path.is_empty()
    }
}

fn build_endpoint(address: &str, path: &str) -> String {
    let address = address.trim_end_matches('/');
    let path = path.trim_matches('/');
    format!("http://{address}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = AgentConfig::default();
        assert_eq!(c.server_address, "localhost:8080");
        assert_eq!(c.poll_interval_secs, 2);
        assert_eq!(c.report_interval_secs, 10);
        assert_eq!(c.rate_limit, 20);
        assert_eq!(c.compress_algo, "gzip");
        assert_eq!(c.client_mode, "http");
        assert!(c.secret_key.is_empty());
    }

    #[test]
    fn endpoints_are_built_from_address_and_paths() {
        let c = AgentConfig::default();
        assert_eq!(c.report_endpoint(), "http://localhost:8080/update");
        assert_eq!(c.report_bulk_endpoint(), "http://localhost:8080/updates");
    }
}
