//! In-memory stand-in for the HTTP transport
//!
//! Each endpoint address is scripted to answer, refuse, return a status code or
//! deny the agent. Every attempt is recorded so tests can assert exactly which
//! endpoints were contacted and in what order.

use agent_transport::constants::protocol;
use agent_transport::{
    AgentRequest, AgentResponse, HostResolver, HttpTransport, StaticResolver, TransportError,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// 200 with a plain body
    Answer,
    /// No response at all
    Refuse,
    /// Respond with the given status code
    Status(u16),
    /// 200 with the error header and the agent-denied marker
    Deny,
}

#[derive(Default)]
pub struct ScriptedTransport {
    behaviors: Mutex<HashMap<IpAddr, Behavior>>,
    calls: Mutex<Vec<IpAddr>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: IpAddr, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(address, behavior);
    }

    pub fn set_all(&self, addresses: &[IpAddr], behavior: Behavior) {
        for address in addresses {
            self.set(*address, behavior);
        }
    }

    /// Endpoints contacted since the last `take_calls`
    pub fn take_calls(&self) -> Vec<IpAddr> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(
        &self,
        _request: &AgentRequest,
        address: IpAddr,
    ) -> Result<AgentResponse, TransportError> {
        self.calls.lock().unwrap().push(address);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or(Behavior::Refuse);

        match behavior {
            Behavior::Answer => Ok(AgentResponse::new(200, HeaderMap::new(), b"ok".to_vec())),
            Behavior::Refuse => Err(TransportError::Connection {
                endpoint: address.to_string(),
                reason: "connection refused".to_string(),
            }),
            Behavior::Status(status) => {
                Ok(AgentResponse::new(status, HeaderMap::new(), Vec::new()))
            }
            Behavior::Deny => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    HeaderName::from_bytes(protocol::ERROR_HEADER.as_bytes()).unwrap(),
                    HeaderValue::from_static("true"),
                );
                let body = format!("{}: agent token rejected", protocol::AGENT_DENIED_MARKER);
                Ok(AgentResponse::new(200, headers, body.into_bytes()))
            }
        }
    }
}

/// Static resolver that counts lookups
pub struct CountingResolver {
    inner: StaticResolver,
    lookups: AtomicUsize,
}

impl CountingResolver {
    pub fn new(inner: StaticResolver) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for CountingResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, TransportError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(host, port).await
    }
}
