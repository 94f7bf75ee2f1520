// File: transport/src/config.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{http, liveness};
use crate::errors::ConfigError;

/// Failover and liveness settings for one logical server URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunicationConfig {
    /// Use every address of a round-robin DNS record, not just the first
    #[serde(default = "default_supports_multi_endpoint")]
    pub supports_multi_endpoint: bool,
    #[serde(default = "default_fail_period_minutes")]
    pub fail_period_minutes: u64,
    #[serde(default = "default_down_period_interval_minutes")]
    pub down_period_interval_minutes: u64,
    #[serde(default = "default_min_down_period_minutes")]
    pub min_down_period_minutes: u64,
    #[serde(default = "default_max_requests_per_connection")]
    pub max_requests_per_connection: u32,
}

fn default_supports_multi_endpoint() -> bool {
    liveness::DEFAULT_SUPPORTS_MULTI_ENDPOINT
}

fn default_fail_period_minutes() -> u64 {
    liveness::DEFAULT_FAIL_PERIOD_MINUTES
}

fn default_down_period_interval_minutes() -> u64 {
    liveness::DEFAULT_DOWN_PERIOD_INTERVAL_MINUTES
}

fn default_min_down_period_minutes() -> u64 {
    liveness::MIN_DOWN_PERIOD_MINUTES
}

fn default_max_requests_per_connection() -> u32 {
    http::DEFAULT_MAX_REQUESTS_PER_CONNECTION
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            supports_multi_endpoint: default_supports_multi_endpoint(),
            fail_period_minutes: default_fail_period_minutes(),
            down_period_interval_minutes: default_down_period_interval_minutes(),
            min_down_period_minutes: default_min_down_period_minutes(),
            max_requests_per_connection: default_max_requests_per_connection(),
        }
    }
}

impl CommunicationConfig {
    pub fn fail_period(&self) -> Duration {
        Duration::from_secs(self.fail_period_minutes * 60)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fail_period_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fail_period_minutes".to_string(),
                reason: "must be at least 1 minute".to_string(),
            });
        }
        if self.max_requests_per_connection == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_requests_per_connection".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the underlying HTTP client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpClientConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub proxy_url: Option<String>,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_connect_timeout() -> u64 {
    http::DEFAULT_CONNECT_TIMEOUT_SECONDS
}

fn default_socket_timeout() -> u64 {
    http::DEFAULT_SOCKET_TIMEOUT_SECONDS
}

fn default_user_agent() -> String {
    http::DEFAULT_USER_AGENT.to_string()
}

fn default_max_response_bytes() -> usize {
    http::DEFAULT_MAX_RESPONSE_BYTES
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            socket_timeout_seconds: default_socket_timeout(),
            user_agent: default_user_agent(),
            proxy_url: None,
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl HttpClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.socket_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "socket_timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_response_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything a `ServerClient` needs besides the server URL
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentClientConfig {
    #[serde(default)]
    pub communication: CommunicationConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
    pub agent_token: Option<String>,
}

impl AgentClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.communication.validate()?;
        self.http.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CommunicationConfig::default();
        assert!(!config.supports_multi_endpoint);
        assert_eq!(config.min_down_period_minutes, 5);
        assert_eq!(config.fail_period(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
        assert!(HttpClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AgentClientConfig = serde_json::from_str(
            r#"{"communication": {"supports_multi_endpoint": true, "fail_period_minutes": 1}}"#,
        )
        .unwrap();

        assert!(config.communication.supports_multi_endpoint);
        assert_eq!(config.communication.fail_period_minutes, 1);
        assert_eq!(config.communication.down_period_interval_minutes, 10);
        assert_eq!(config.http, HttpClientConfig::default());
        assert!(config.agent_token.is_none());
    }

    #[test]
    fn test_zero_fail_period_rejected() {
        let config = CommunicationConfig {
            fail_period_minutes: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fail_period_minutes"));
    }

    #[test]
    fn test_zero_socket_timeout_rejected() {
        let config = AgentClientConfig {
            http: HttpClientConfig {
                socket_timeout_seconds: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
