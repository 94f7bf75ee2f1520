// File: transport/src/http/transport.rs
use async_trait::async_trait;
use reqwest::header::CONNECTION;
use reqwest::{Client, ClientBuilder, Proxy, Url};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{CommunicationConfig, HttpClientConfig};
use crate::errors::{ConfigError, TransportError};
use crate::request::{AgentRequest, AgentResponse, Method};

/// Issues one request to one concrete endpoint address.
///
/// The request keeps its logical URL, so the server sees the logical host in
/// `Host` and TLS verifies the certificate against it. Implementations report
/// "no response" as [`TransportError::Connection`] and hand back every
/// received response, whatever its status. Classifying status codes is the
/// endpoint's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        request: &AgentRequest,
        address: IpAddr,
    ) -> Result<AgentResponse, TransportError>;
}

/// Client pinned to one endpoint address, with its own connection pool
struct EndpointClient {
    client: Client,
    requests: AtomicU32,
}

impl EndpointClient {
    /// Every Nth request through this client asks the server to close the
    /// connection afterwards. Requests to one endpoint are serialized by the
    /// servers manager, so the pool normally holds a single connection and N
    /// is the per-connection count.
    fn should_close_connection(&self, max_requests_per_connection: u32) -> bool {
        let sent = self.requests.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        sent % max_requests_per_connection == 0
    }
}

/// reqwest-backed transport used by agents in production
pub struct ReqwestTransport {
    http: HttpClientConfig,
    proxy: Option<Proxy>,
    max_requests_per_connection: u32,
    max_response_bytes: usize,
    clients: Mutex<HashMap<(String, IpAddr), Arc<EndpointClient>>>,
}

impl ReqwestTransport {
    pub fn new(
        http: &HttpClientConfig,
        communication: &CommunicationConfig,
    ) -> Result<Self, ConfigError> {
        http.validate()?;
        communication.validate()?;

        let proxy = match &http.proxy_url {
            Some(proxy_url) => Some(Proxy::all(proxy_url).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "proxy_url".to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let transport = Self {
            http: http.clone(),
            proxy,
            max_requests_per_connection: communication.max_requests_per_connection,
            max_response_bytes: http.max_response_bytes,
            clients: Mutex::new(HashMap::new()),
        };

        // Surface TLS backend or builder problems at startup rather than on
        // the first request.
        transport
            .client_builder()
            .build()
            .map_err(|e| ConfigError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(transport)
    }

    fn client_builder(&self) -> ClientBuilder {
        let mut builder = Client::builder()
            .connect_timeout(self.http.connect_timeout())
            .timeout(self.http.socket_timeout())
            .user_agent(self.http.user_agent.clone());

        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }
        builder
    }

    /// Client for `host` whose connections all go to `address`. Port 0 keeps
    /// the port from the request URL.
    async fn client_for(
        &self,
        host: &str,
        address: IpAddr,
    ) -> Result<Arc<EndpointClient>, TransportError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&(host.to_string(), address)) {
            return Ok(client.clone());
        }

        let mut builder = self.client_builder();
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if literal.parse::<IpAddr>().is_err() {
            builder = builder.resolve(host, SocketAddr::new(address, 0));
        }

        let client = builder.build().map_err(|e| TransportError::Connection {
            endpoint: address.to_string(),
            reason: format!("failed to build HTTP client: {}", e),
        })?;

        debug!("Created HTTP client for {} pinned to {}", host, address);
        let client = Arc::new(EndpointClient {
            client,
            requests: AtomicU32::new(0),
        });
        clients.insert((host.to_string(), address), client.clone());
        Ok(client)
    }

    fn oversized(&self, endpoint: &str, size: u64) -> TransportError {
        TransportError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!(
                "response body of at least {} bytes exceeds limit of {} bytes",
                size, self.max_response_bytes
            ),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &AgentRequest,
        address: IpAddr,
    ) -> Result<AgentResponse, TransportError> {
        let url: &Url = request.url();
        let endpoint = address.to_string();
        let host = url.host_str().ok_or_else(|| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;

        let pinned = self.client_for(host, address).await?;

        let mut builder = match request.method() {
            Method::Get => pinned.client.get(url.clone()),
            Method::Post => pinned.client.post(url.clone()).form(request.params()),
        };

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if pinned.should_close_connection(self.max_requests_per_connection) {
            debug!("Retiring connection to {} after this request", endpoint);
            builder = builder.header(CONNECTION, "close");
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let limit = self.max_response_bytes as u64;
        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(self.oversized(&endpoint, length));
            }
        }

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        // Read chunk by chunk so a body without Content-Length is cut off at
        // the limit instead of being buffered whole.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: endpoint.clone(),
                reason: format!("failed to read response body: {}", e),
            })?
        {
            let read = (body.len() + chunk.len()) as u64;
            if read > limit {
                return Err(self.oversized(&endpoint, read));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(AgentResponse::new(status, headers, body))
    }
}
