use anyhow::Result;
use tracing_subscriber::EnvFilter;

use pulsemon_agent::config::AgentConfig;
use pulsemon_agent::run;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load_or_default(&config_path)?;

    run::run(config).await
}
