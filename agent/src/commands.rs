//! Agent → management server commands
//!
//! Registration is a low-frequency call and goes through the exhaustive mode,
//! so any reachable endpoint will do. Heartbeats go through the affinity mode
//! and share the breaker with every other reporting pipeline in the process.

use agent_transport::{ServerClient, TransportError};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AgentConfig;

pub const REGISTER_PATH: &str = "registerAgent";
pub const PING_PATH: &str = "ping";

pub struct AgentCommands {
    client: ServerClient,
    agent_name: String,
    agent_token: String,
    sequence: AtomicU64,
}

impl AgentCommands {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let agent_token = match &config.agent_token {
            Some(token) => token.clone(),
            None => {
                let token = Uuid::new_v4().to_string();
                info!("No agent token configured, generated {}", token);
                token
            }
        };

        let client = ServerClient::new(
            &config.server_url,
            &config.client_config(Some(agent_token.clone())),
        )
        .map_err(|e| anyhow!("Failed to create server client: {}", e))?;

        Ok(Self::from_client(client, config.agent_name.clone(), agent_token))
    }

    pub fn from_client(client: ServerClient, agent_name: String, agent_token: String) -> Self {
        Self {
            client,
            agent_name,
            agent_token,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn agent_token(&self) -> &str {
        &self.agent_token
    }

    pub fn client(&self) -> &ServerClient {
        &self.client
    }

    #[instrument(skip(self), fields(agent = %self.agent_name))]
    pub async fn register(&self) -> Result<()> {
        let registered_at = Utc::now().to_rfc3339();
        let response = self
            .client
            .post_try_all(
                REGISTER_PATH,
                &[
                    ("agentName", self.agent_name.as_str()),
                    ("agentToken", self.agent_token.as_str()),
                    ("registeredAt", registered_at.as_str()),
                ],
            )
            .await
            .map_err(|e| describe_failure("Registration", e))?;

        if !response.is_success() {
            return Err(anyhow!(
                "Registration rejected with status {}: {}",
                response.status(),
                response.text()
            ));
        }

        info!("Agent {} registered with management server", self.agent_name);
        Ok(())
    }

    /// Sends one heartbeat and returns its sequence number
    pub async fn ping(&self) -> Result<u64> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let sequence_str = sequence.to_string();
        let sent_at = Utc::now().to_rfc3339();

        let response = self
            .client
            .post(
                PING_PATH,
                &[
                    ("agentToken", self.agent_token.as_str()),
                    ("sequence", sequence_str.as_str()),
                    ("sentAt", sent_at.as_str()),
                ],
            )
            .await
            .map_err(|e| describe_failure("Heartbeat", e))?;

        if !response.is_success() {
            return Err(anyhow!("Heartbeat #{} answered with status {}", sequence, response.status()));
        }

        debug!("Heartbeat #{} acknowledged", sequence);
        Ok(sequence)
    }

    pub async fn log_status(&self) {
        let status = self.client.status().await;
        match serde_json::to_string(&status) {
            Ok(json) => info!("Transport status: {}", json),
            Err(e) => warn!("Failed to serialize transport status: {}", e),
        }
    }
}

fn describe_failure(operation: &str, err: TransportError) -> anyhow::Error {
    if err.is_unauthorized() {
        anyhow!("{} denied: check the agent token ({})", operation, err)
    } else if err.is_service_unavailable() {
        anyhow!("{} skipped: management server unavailable", operation)
    } else {
        anyhow!("{} failed: {}", operation, err)
    }
}
