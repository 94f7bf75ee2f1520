//! Common addresses, configurations and manager builders

use agent_transport::{
    AgentRequest, CommunicationConfig, HostResolver, ServersManager, StaticResolver,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Url;
use std::net::IpAddr;
use std::sync::Arc;

use super::scripted_transport::ScriptedTransport;

pub const SERVER_HOST: &str = "hq.agents.test";
pub const SERVER_URL: &str = "https://hq.agents.test:7443/lather/";
pub const SEED: u64 = 42;

pub fn address(last_octet: u8) -> IpAddr {
    IpAddr::from([10, 20, 0, last_octet])
}

pub fn addresses(count: u8) -> Vec<IpAddr> {
    (1..=count).map(address).collect()
}

pub fn server_url() -> Url {
    Url::parse(SERVER_URL).unwrap()
}

pub fn ping_request() -> AgentRequest {
    AgentRequest::post(server_url().join("ping").unwrap()).with_param("agentToken", "t-1")
}

pub fn multi_endpoint_config() -> CommunicationConfig {
    CommunicationConfig {
        supports_multi_endpoint: true,
        fail_period_minutes: 1,
        down_period_interval_minutes: 10,
        ..Default::default()
    }
}

pub fn single_endpoint_config() -> CommunicationConfig {
    CommunicationConfig {
        supports_multi_endpoint: false,
        fail_period_minutes: 1,
        down_period_interval_minutes: 10,
        ..Default::default()
    }
}

pub fn manager_with_resolver(
    config: CommunicationConfig,
    transport: Arc<ScriptedTransport>,
    resolver: Arc<dyn HostResolver>,
) -> ServersManager {
    ServersManager::with_parts(
        server_url(),
        config,
        transport,
        resolver,
        Box::new(StdRng::seed_from_u64(SEED)),
    )
}

pub fn manager(
    resolved: &[IpAddr],
    config: CommunicationConfig,
    transport: Arc<ScriptedTransport>,
) -> ServersManager {
    let resolver = StaticResolver::new().with_host(SERVER_HOST, resolved.to_vec());
    manager_with_resolver(config, transport, Arc::new(resolver))
}
