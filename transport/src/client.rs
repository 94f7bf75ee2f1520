// File: transport/src/client.rs
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::AgentClientConfig;
use crate::constants::protocol;
use crate::errors::{ConfigError, TransportError};
use crate::http::ReqwestTransport;
use crate::request::{AgentRequest, AgentResponse, Method};
use crate::servers_manager::{ManagerStatus, ServersManager};

/// Agent-facing client for one management server.
///
/// Requests are addressed by paths relative to the server URL. Clones share
/// the same [`ServersManager`], so endpoint liveness, affinity and the breaker
/// are common to every caller in the process.
#[derive(Clone)]
pub struct ServerClient {
    base_url: Url,
    default_headers: BTreeMap<String, String>,
    manager: Arc<ServersManager>,
}

impl ServerClient {
    pub fn new(server_url: &str, config: &AgentClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_url = parse_base_url(server_url)?;

        let transport = ReqwestTransport::new(&config.http, &config.communication)?;
        let manager = ServersManager::new(
            base_url.clone(),
            config.communication.clone(),
            Arc::new(transport),
        );

        Ok(Self::with_manager(
            base_url,
            Arc::new(manager),
            config.agent_token.clone(),
        ))
    }

    /// Client over an existing manager. `base_url` should point at the same
    /// server the manager was built for.
    pub fn with_manager(
        base_url: Url,
        manager: Arc<ServersManager>,
        agent_token: Option<String>,
    ) -> Self {
        let mut default_headers = BTreeMap::new();
        if let Some(token) = agent_token {
            default_headers.insert(protocol::AGENT_TOKEN_HEADER.to_string(), token);
        }

        Self {
            base_url: with_trailing_slash(base_url),
            default_headers,
            manager,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn manager(&self) -> &Arc<ServersManager> {
        &self.manager
    }

    /// Replaces the agent token sent with every request
    pub fn set_agent_token(&mut self, token: impl Into<String>) {
        self.default_headers
            .insert(protocol::AGENT_TOKEN_HEADER.to_string(), token.into());
    }

    pub fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                reason: e.to_string(),
            })
    }

    /// Request for `path` carrying the default agent headers
    pub fn request(&self, method: Method, path: &str) -> Result<AgentRequest, TransportError> {
        let mut request = AgentRequest::new(method, self.url_for(path)?);
        for (name, value) in &self.default_headers {
            request.set_header(name.clone(), value.clone());
        }
        Ok(request)
    }

    pub async fn get(&self, path: &str) -> Result<AgentResponse, TransportError> {
        let request = self.request(Method::Get, path)?;
        self.send(&request).await
    }

    pub async fn post(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<AgentResponse, TransportError> {
        let request = self.post_request(path, params)?;
        self.send(&request).await
    }

    /// POST through the exhaustive mode, for low-frequency calls such as
    /// registration where affinity does not matter.
    pub async fn post_try_all(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<AgentResponse, TransportError> {
        let request = self.post_request(path, params)?;
        self.send_try_all(&request).await
    }

    pub async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, TransportError> {
        self.manager.send(request).await
    }

    pub async fn send_try_all(
        &self,
        request: &AgentRequest,
    ) -> Result<AgentResponse, TransportError> {
        self.manager.send_try_all(request).await
    }

    pub async fn status(&self) -> ManagerStatus {
        self.manager.status().await
    }

    fn post_request(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<AgentRequest, TransportError> {
        let mut request = self.request(Method::Post, path)?;
        for (name, value) in params {
            request.set_param(*name, *value);
        }
        debug!("Prepared POST {} with {} param(s)", request.url(), params.len());
        Ok(request)
    }
}

fn parse_base_url(server_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(server_url).map_err(|e| ConfigError::InvalidValue {
        field: "server_url".to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidValue {
            field: "server_url".to_string(),
            reason: format!("'{}' is not an http(s) URL with a host", server_url),
        });
    }
    Ok(url)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn client(server_url: &str, token: Option<&str>) -> ServerClient {
        let config = AgentClientConfig {
            agent_token: token.map(str::to_string),
            ..Default::default()
        };
        ServerClient::new(server_url, &config).unwrap()
    }

    #[rstest]
    #[case("https://hq.example.com:7443/lather", "ping", "https://hq.example.com:7443/lather/ping")]
    #[case("https://hq.example.com:7443/lather/", "/ping", "https://hq.example.com:7443/lather/ping")]
    #[case("http://hq.example.com", "registerAgent", "http://hq.example.com/registerAgent")]
    fn test_paths_resolve_under_base(
        #[case] server_url: &str,
        #[case] path: &str,
        #[case] expected: &str,
    ) {
        let client = client(server_url, None);
        assert_eq!(client.url_for(path).unwrap().as_str(), expected);
    }

    #[test]
    fn test_default_headers_applied() {
        let mut client = client("http://hq.example.com/lather", Some("token-1"));
        let request = client.request(Method::Get, "ping").unwrap();
        assert_eq!(
            request.headers().get(protocol::AGENT_TOKEN_HEADER).map(String::as_str),
            Some("token-1")
        );

        client.set_agent_token("token-2");
        let request = client.post_request("ping", &[("a", "b")]).unwrap();
        assert_eq!(
            request.headers().get(protocol::AGENT_TOKEN_HEADER).map(String::as_str),
            Some("token-2")
        );
        assert_eq!(request.params().get("a").map(String::as_str), Some("b"));
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://hq.example.com/lather")]
    fn test_rejects_unusable_server_urls(#[case] server_url: &str) {
        let result = ServerClient::new(server_url, &AgentClientConfig::default());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_clones_share_manager() {
        let client = client("http://hq.example.com/lather", None);
        let clone = client.clone();
        assert!(Arc::ptr_eq(client.manager(), clone.manager()));

        let status = clone.status().await;
        assert!(!status.resolved);
        assert!(status.endpoints.is_empty());
        assert!(!status.breaker_open);
    }
}
