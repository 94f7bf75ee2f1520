//! Resilient HTTP transport between monitoring agents and their management
//! server: DNS-based endpoint failover, per-endpoint liveness windows with
//! randomized down periods, preferred/sticky endpoint affinity and a global
//! circuit breaker.

pub mod client;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod errors;
pub mod http;
pub mod request;
pub mod resolver;
pub mod servers_manager;

// Re-export commonly used types
pub use client::ServerClient;
pub use config::{AgentClientConfig, CommunicationConfig, HttpClientConfig};
pub use endpoint::{Endpoint, EndpointRole, EndpointStatus};
pub use errors::{ConfigError, TransportError};
pub use http::{HttpTransport, ReqwestTransport};
pub use request::{AgentRequest, AgentResponse, Method};
pub use resolver::{EndpointSet, HostResolver, StaticResolver, SystemResolver};
pub use servers_manager::{ManagerStatus, ServersManager};
