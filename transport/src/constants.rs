//! Central repository for transport defaults and protocol markers
//!
//! Organized by category so that configuration defaults, liveness windows and
//! the management server's signalling conventions live in one place.

/// Endpoint liveness and failover defaults
pub mod liveness {
    /// Minutes without a successful send before an endpoint is declared down
    pub const DEFAULT_FAIL_PERIOD_MINUTES: u64 = 5;

    /// Width of the random window added on top of the minimum down period
    pub const DEFAULT_DOWN_PERIOD_INTERVAL_MINUTES: u64 = 10;

    /// Floor for every sampled down period
    pub const MIN_DOWN_PERIOD_MINUTES: u64 = 5;

    /// Round-robin DNS fan-out is opt-in
    pub const DEFAULT_SUPPORTS_MULTI_ENDPOINT: bool = false;
}

/// HTTP client defaults
pub mod http {
    /// Timeout for establishing a connection to an endpoint
    pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

    /// Timeout for a whole request/response exchange
    pub const DEFAULT_SOCKET_TIMEOUT_SECONDS: u64 = 30;

    /// Requests sent over one pooled connection before it is retired
    pub const DEFAULT_MAX_REQUESTS_PER_CONNECTION: u32 = 100;

    /// Upper bound for buffered control-plane responses (4 MiB)
    pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

    pub const DEFAULT_USER_AGENT: &str = concat!("agent-transport/", env!("CARGO_PKG_VERSION"));
}

/// Management server signalling conventions
pub mod protocol {
    /// Header the server attaches to 200 responses that carry an error payload
    pub const ERROR_HEADER: &str = "X-error-response";

    /// Body marker identifying a rejected (unauthorized) agent
    pub const AGENT_DENIED_MARKER: &str = "AgentUnauthorizedException";

    /// Header carrying the agent's token on every request
    pub const AGENT_TOKEN_HEADER: &str = "X-Agent-Token";

    /// Status codes the server uses while unavailable or in maintenance
    pub const UNREACHABLE_STATUS_CODES: [u16; 2] = [503, 404];
}
