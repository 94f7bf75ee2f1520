//! Endpoint selection and the global circuit breaker
//!
//! One [`ServersManager`] exists per logical server URL. It resolves the
//! endpoint set on first use and routes each request:
//!
//! 1. the preferred endpoint, when available;
//! 2. the sticky alternate (last alternate that served a request);
//! 3. a scan of all alternates, the first success becoming sticky.
//!
//! When the scan comes up empty the breaker opens and every call fails fast
//! with [`TransportError::ServiceUnavailable`] until its window elapses.
//!
//! All selection state sits behind a single async mutex that is held for the
//! whole decide-and-attempt sequence, network call included.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use reqwest::Url;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::CommunicationConfig;
use crate::endpoint::EndpointStatus;
use crate::errors::TransportError;
use crate::http::HttpTransport;
use crate::request::{AgentRequest, AgentResponse};
use crate::resolver::{resolve_endpoints, EndpointSet, HostResolver, SystemResolver};

/// Manager-wide "all endpoints down" state
#[derive(Debug)]
struct GlobalBreaker {
    open: bool,
    opened_at: Instant,
    duration: Duration,
}

impl GlobalBreaker {
    fn new() -> Self {
        Self {
            open: false,
            opened_at: Instant::now(),
            duration: Duration::ZERO,
        }
    }

    /// True while the open window lasts. Closes the breaker once the window
    /// has elapsed so the next attempt goes through.
    fn is_open(&mut self) -> bool {
        if !self.open {
            return false;
        }
        if Instant::now().duration_since(self.opened_at) > self.duration {
            info!("Global down period elapsed, allowing the next attempt through");
            self.open = false;
            return false;
        }
        true
    }

    fn trip(&mut self, duration: Duration) {
        self.open = true;
        self.opened_at = Instant::now();
        self.duration = duration;
    }

    fn remaining(&self) -> Option<Duration> {
        self.open
            .then(|| (self.opened_at + self.duration).saturating_duration_since(Instant::now()))
    }
}

struct ManagerState {
    endpoints: Option<EndpointSet>,
    resolution_error: Option<TransportError>,
    sticky_alternate: Option<usize>,
    breaker: GlobalBreaker,
    try_all_order: Vec<usize>,
    rng: Box<dyn RngCore + Send>,
}

/// Serializable view of the manager for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub server_url: String,
    pub resolved: bool,
    pub endpoints: Vec<EndpointStatus>,
    pub sticky_alternate: Option<IpAddr>,
    pub breaker_open: bool,
    pub breaker_remaining_seconds: Option<u64>,
}

pub struct ServersManager {
    server_url: Url,
    config: CommunicationConfig,
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<dyn HostResolver>,
    state: Mutex<ManagerState>,
}

impl ServersManager {
    /// Manager using the platform resolver and an OS-seeded random source.
    /// Nothing is resolved until the first send.
    pub fn new(
        server_url: Url,
        config: CommunicationConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::with_parts(
            server_url,
            config,
            transport,
            Arc::new(SystemResolver),
            Box::new(StdRng::from_rng(&mut rand::rng())),
        )
    }

    pub fn with_parts(
        server_url: Url,
        config: CommunicationConfig,
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<dyn HostResolver>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            server_url,
            config,
            transport,
            resolver,
            state: Mutex::new(ManagerState {
                endpoints: None,
                resolution_error: None,
                sticky_alternate: None,
                breaker: GlobalBreaker::new(),
                try_all_order: Vec::new(),
                rng,
            }),
        }
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn config(&self) -> &CommunicationConfig {
        &self.config
    }

    /// Resolves once. A failed resolution is remembered and returned to every
    /// later caller; a new manager is needed to try again.
    async fn ensure_resolved<'a>(
        &self,
        endpoints: &'a mut Option<EndpointSet>,
        resolution_error: &mut Option<TransportError>,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<&'a mut EndpointSet, TransportError> {
        if let Some(err) = resolution_error {
            return Err(err.clone());
        }

        if endpoints.is_none() {
            match resolve_endpoints(&self.server_url, &self.config, &*self.resolver, rng).await {
                Ok(set) => *endpoints = Some(set),
                Err(err) => {
                    warn!("Failed to resolve {}: {}", self.server_url, err);
                    *resolution_error = Some(err.clone());
                    return Err(err);
                }
            }
        }

        endpoints.as_mut().ok_or(TransportError::ServiceUnavailable)
    }

    /// Sends with endpoint affinity: preferred, then sticky alternate, then a
    /// scan of the alternates. Opens the global breaker when the scan fails.
    #[instrument(skip(self, request), fields(method = request.method().as_str(), url = %request.url()))]
    pub async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, TransportError> {
        let mut guard = self.state.lock().await;
        let ManagerState {
            endpoints,
            resolution_error,
            sticky_alternate,
            breaker,
            rng,
            ..
        } = &mut *guard;

        let endpoints = self
            .ensure_resolved(endpoints, resolution_error, rng.as_mut())
            .await?;

        if breaker.open {
            if breaker.is_open() {
                debug!("Global breaker open, failing fast");
                return Err(TransportError::ServiceUnavailable);
            }
            // The global down period covers every endpoint's own cooldown.
            endpoints.rearm_all();
        }

        let transport = &*self.transport;
        let mut last_error: Option<TransportError> = None;

        let preferred = endpoints.get_mut(0).ok_or(TransportError::ServiceUnavailable)?;
        if preferred.is_available(rng.as_mut()) {
            match preferred.send(transport, request).await {
                Ok(response) => {
                    if let Some(index) = sticky_alternate.take() {
                        info!(
                            "Preferred endpoint {} answered, dropping affinity to alternate #{}",
                            preferred.address(),
                            index
                        );
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_connectivity() => return Err(err),
                Err(err) => {
                    warn!("Preferred endpoint {} failed: {}", preferred.address(), err);
                    last_error = Some(err);
                }
            }
        }

        let mut tried_sticky = None;
        if let Some(index) = *sticky_alternate {
            if let Some(endpoint) = endpoints.get_mut(index) {
                if endpoint.is_available(rng.as_mut()) {
                    tried_sticky = Some(index);
                    match endpoint.send(transport, request).await {
                        Ok(response) => return Ok(response),
                        Err(err) if !err.is_connectivity() => return Err(err),
                        Err(err) => {
                            warn!("Alternate endpoint {} failed: {}", endpoint.address(), err);
                            *sticky_alternate = None;
                            last_error = Some(err);
                        }
                    }
                }
            }
        }

        if endpoints.alternate_count() == 0 {
            return Err(last_error.unwrap_or(TransportError::ServiceUnavailable));
        }

        for index in 1..endpoints.len() {
            if tried_sticky == Some(index) {
                continue;
            }
            let Some(endpoint) = endpoints.get_mut(index) else {
                continue;
            };
            if !endpoint.is_available(rng.as_mut()) {
                continue;
            }
            match endpoint.send(transport, request).await {
                Ok(response) => {
                    info!("Alternate endpoint {} is now sticky", endpoint.address());
                    *sticky_alternate = Some(index);
                    return Ok(response);
                }
                Err(err) if !err.is_connectivity() => return Err(err),
                Err(err) => {
                    warn!("Alternate endpoint {} failed: {}", endpoint.address(), err);
                    last_error = Some(err);
                }
            }
        }

        let duration = endpoints.preferred().sample_down_period(rng.as_mut());
        breaker.trip(duration);
        warn!(
            "All {} endpoints of {} are down, failing fast for {}m",
            endpoints.len(),
            self.server_url,
            duration.as_secs() / 60
        );

        Err(last_error.unwrap_or(TransportError::ServiceUnavailable))
    }

    /// Tries every endpoint in turn, ignoring liveness and the breaker. The
    /// endpoint that answers moves to the front for the next call.
    #[instrument(skip(self, request), fields(method = request.method().as_str(), url = %request.url()))]
    pub async fn send_try_all(
        &self,
        request: &AgentRequest,
    ) -> Result<AgentResponse, TransportError> {
        let mut guard = self.state.lock().await;
        let ManagerState {
            endpoints,
            resolution_error,
            try_all_order,
            rng,
            ..
        } = &mut *guard;

        let endpoints = self
            .ensure_resolved(endpoints, resolution_error, rng.as_mut())
            .await?;

        if try_all_order.is_empty() {
            try_all_order.extend(0..endpoints.len());
        }

        let transport = &*self.transport;
        let mut last_error: Option<TransportError> = None;

        for position in 0..try_all_order.len() {
            let index = try_all_order[position];
            let Some(endpoint) = endpoints.get_mut(index) else {
                continue;
            };
            match endpoint.send(transport, request).await {
                Ok(response) => {
                    if position > 0 {
                        debug!("Moving endpoint {} to the front", endpoint.address());
                        let index = try_all_order.remove(position);
                        try_all_order.insert(0, index);
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_connectivity() => return Err(err),
                Err(err) => {
                    warn!("Endpoint {} failed: {}", endpoint.address(), err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(TransportError::ServiceUnavailable))
    }

    /// Endpoint addresses in the order `send_try_all` will try them next.
    /// Empty until the first send.
    pub async fn try_all_order(&self) -> Vec<IpAddr> {
        let state = self.state.lock().await;
        let Some(endpoints) = state.endpoints.as_ref() else {
            return Vec::new();
        };
        if state.try_all_order.is_empty() {
            return endpoints.addresses();
        }
        state
            .try_all_order
            .iter()
            .filter_map(|&index| endpoints.get(index).map(|e| e.address()))
            .collect()
    }

    pub async fn status(&self) -> ManagerStatus {
        let state = self.state.lock().await;
        let endpoints = state.endpoints.as_ref();
        let remaining = state.breaker.remaining();

        ManagerStatus {
            server_url: self.server_url.to_string(),
            resolved: endpoints.is_some(),
            endpoints: endpoints.map(EndpointSet::statuses).unwrap_or_default(),
            sticky_alternate: state
                .sticky_alternate
                .and_then(|index| endpoints.and_then(|set| set.get(index)))
                .map(|e| e.address()),
            breaker_open: remaining.is_some_and(|r| !r.is_zero()),
            breaker_remaining_seconds: remaining.map(|r| r.as_secs()),
        }
    }
}
