//! Liveness tracking for one resolved address of the management server
//!
//! An endpoint is either up or down. Liveness is evaluated lazily: every
//! [`Endpoint::is_available`] call is also the point where the state flips.
//!
//! ```text
//!        no success for fail_period            down_period elapsed
//!   Up ──────────────────────────────► Down ─────────────────────► Up
//!    ▲                                   │
//!    └────────── successful send ────────┘
//! ```

use rand::Rng;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CommunicationConfig;
use crate::constants::protocol;
use crate::errors::TransportError;
use crate::http::HttpTransport;
use crate::request::{AgentRequest, AgentResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    Preferred,
    Alternate,
}

/// Point-in-time view of an endpoint for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub address: IpAddr,
    pub role: EndpointRole,
    pub is_down: bool,
    pub seconds_since_success: u64,
    /// Remaining seconds of the current down period, if down
    pub down_remaining_seconds: Option<u64>,
}

#[derive(Debug)]
pub struct Endpoint {
    address: IpAddr,
    fail_period: Duration,
    min_down_period_minutes: u64,
    down_period_interval_minutes: u64,
    last_success: Instant,
    is_down: bool,
    down_since: Instant,
    down_period: Duration,
}

impl Endpoint {
    pub fn new(address: IpAddr, config: &CommunicationConfig) -> Self {
        let now = Instant::now();
        Self {
            address,
            fail_period: config.fail_period(),
            min_down_period_minutes: config.min_down_period_minutes,
            down_period_interval_minutes: config.down_period_interval_minutes,
            last_success: now,
            is_down: false,
            down_since: now,
            down_period: Duration::ZERO,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn is_down(&self) -> bool {
        self.is_down
    }

    /// Down period sampled at the last Up → Down transition
    pub fn down_period(&self) -> Duration {
        self.down_period
    }

    pub fn last_success(&self) -> Instant {
        self.last_success
    }

    /// Draws a down period in `[min, min + interval)` minutes.
    pub fn sample_down_period<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter = if self.down_period_interval_minutes == 0 {
            0
        } else {
            rng.random_range(0..self.down_period_interval_minutes)
        };
        Duration::from_secs((self.min_down_period_minutes + jitter) * 60)
    }

    /// Liveness verdict. Not idempotent: may move the endpoint between Up and
    /// Down as a side effect.
    pub fn is_available<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let now = Instant::now();

        if self.is_down {
            if now.duration_since(self.down_since) > self.down_period {
                info!(
                    "Endpoint {} down period of {}m elapsed, marking available",
                    self.address,
                    self.down_period.as_secs() / 60
                );
                self.is_down = false;
                return true;
            }
            return false;
        }

        if now >= self.last_success + self.fail_period {
            self.down_period = self.sample_down_period(rng);
            self.down_since = now;
            self.is_down = true;
            warn!(
                "Endpoint {} has had no successful request for {}s, marking down for {}m",
                self.address,
                now.duration_since(self.last_success).as_secs(),
                self.down_period.as_secs() / 60
            );
            return false;
        }

        true
    }

    /// Sends the request to this endpoint and classifies the outcome. The
    /// request keeps its logical URL; only the connection goes to this address.
    pub async fn send(
        &mut self,
        transport: &dyn HttpTransport,
        request: &AgentRequest,
    ) -> Result<AgentResponse, TransportError> {
        debug!(
            "{} {} via endpoint {}",
            request.method().as_str(),
            request.url(),
            self.address
        );

        let response = transport.execute(request, self.address).await?;
        let status = response.status();

        if protocol::UNREACHABLE_STATUS_CODES.contains(&status) {
            return Err(TransportError::NotReachable {
                endpoint: self.address.to_string(),
                status,
            });
        }

        // The body is already buffered, so inspecting it here leaves it
        // readable for the caller.
        if status == 200
            && response.has_header(protocol::ERROR_HEADER)
            && response.text().contains(protocol::AGENT_DENIED_MARKER)
        {
            return Err(TransportError::Unauthorized {
                endpoint: self.address.to_string(),
            });
        }

        self.record_success();
        Ok(response)
    }

    /// Gives the endpoint a fresh fail window, as if its down period had just
    /// elapsed. Used when the global breaker closes.
    pub(crate) fn rearm(&mut self) {
        self.is_down = false;
        self.last_success = Instant::now();
    }

    pub(crate) fn record_success(&mut self) {
        if self.is_down {
            info!("Endpoint {} is reachable again", self.address);
        }
        self.last_success = Instant::now();
        self.is_down = false;
    }

    pub fn status(&self, role: EndpointRole) -> EndpointStatus {
        let now = Instant::now();
        let down_remaining_seconds = self.is_down.then(|| {
            (self.down_since + self.down_period)
                .saturating_duration_since(now)
                .as_secs()
        });

        EndpointStatus {
            address: self.address,
            role,
            is_down: self.is_down,
            seconds_since_success: now.duration_since(self.last_success).as_secs(),
            down_remaining_seconds,
        }
    }
}
