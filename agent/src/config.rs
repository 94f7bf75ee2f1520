// File: agent/src/config.rs
use agent_transport::{AgentClientConfig, CommunicationConfig, HttpClientConfig};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Logical management server URL, e.g. `https://hq.example.com:7443/lather`
    pub server_url: String,
    pub agent_name: String,
    /// Generated at startup when absent
    pub agent_token: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Log the transport status every N heartbeats
    #[serde(default = "default_status_log_every")]
    pub status_log_every: u64,
    #[serde(default)]
    pub communication: CommunicationConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_status_log_every() -> u64 {
    10
}

impl AgentConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading agent config: {}", path.display());

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read agent config {}: {}", path.display(), e))?;

        let config: AgentConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_name.trim().is_empty() {
            return Err(anyhow!("agent_name must not be empty"));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow!("heartbeat_interval_seconds must be greater than zero"));
        }
        if self.status_log_every == 0 {
            return Err(anyhow!("status_log_every must be greater than zero"));
        }
        self.client_config(None)
            .validate()
            .map_err(|e| anyhow!("Invalid transport configuration: {}", e))
    }

    pub fn client_config(&self, agent_token: Option<String>) -> AgentClientConfig {
        AgentClientConfig {
            communication: self.communication.clone(),
            http: self.http.clone(),
            agent_token,
        }
    }
}
