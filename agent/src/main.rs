// File: agent/src/main.rs
use agent::config::DEFAULT_CONFIG_PATH;
use agent::{AgentCommands, AgentConfig};
use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("agent=info".parse()?)
        .add_directive("agent_transport=info".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AgentConfig::load(&config_path).await?;
    info!(
        "Starting agent {} reporting to {} (multi-endpoint: {})",
        config.agent_name, config.server_url, config.communication.supports_multi_endpoint
    );

    let commands = AgentCommands::new(&config)?;

    if let Err(e) = commands.register().await {
        error!("Initial registration failed: {}", e);
        warn!("Continuing with heartbeats; the server will see the agent once it is reachable");
    }

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.heartbeat_interval_seconds));
    let mut cycle = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping heartbeats");
                commands.log_status().await;
                return Ok(());
            }
        }

        cycle += 1;
        if let Err(e) = commands.ping().await {
            warn!("{}", e);
        }

        if cycle.is_multiple_of(config.status_log_every) {
            commands.log_status().await;
        }
    }
}
