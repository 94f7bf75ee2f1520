//! Endpoint set resolution
//!
//! Turns the logical server URL into a preferred endpoint plus, when
//! round-robin DNS support is enabled, a shuffled list of alternates.
//! Shuffling spreads failover load: agents started together against the same
//! DNS record do not all fail over to the same alternate.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Url;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::config::CommunicationConfig;
use crate::endpoint::{Endpoint, EndpointRole, EndpointStatus};
use crate::errors::TransportError;

/// Resolves a hostname to an ordered list of addresses
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, TransportError>;
}

/// Platform resolver (getaddrinfo through tokio)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, TransportError> {
        let addresses = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| TransportError::UnknownHost {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
        Ok(addresses.map(|a| a.ip()).collect())
    }
}

/// Fixed host → addresses table; hosts missing from the table are unknown
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        self.hosts.insert(host.into(), addresses);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> Result<Vec<IpAddr>, TransportError> {
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| TransportError::UnknownHost {
                host: host.to_string(),
                reason: "not in static host table".to_string(),
            })
    }
}

/// Preferred endpoint at index 0, alternates after it
#[derive(Debug)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Builds the set from resolved addresses. `addresses` must not be empty.
    pub(crate) fn from_addresses<R: Rng + ?Sized>(
        addresses: Vec<IpAddr>,
        config: &CommunicationConfig,
        rng: &mut R,
    ) -> Self {
        let mut unique: Vec<IpAddr> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !unique.contains(&address) {
                unique.push(address);
            }
        }

        if !config.supports_multi_endpoint {
            unique.truncate(1);
        }

        if unique.len() > 2 {
            unique[1..].shuffle(rng);
        }

        Self {
            endpoints: unique
                .into_iter()
                .map(|address| Endpoint::new(address, config))
                .collect(),
        }
    }

    pub fn preferred(&self) -> &Endpoint {
        &self.endpoints[0]
    }

    pub fn alternates(&self) -> &[Endpoint] {
        self.endpoints.get(1..).unwrap_or(&[])
    }

    pub fn alternate_count(&self) -> usize {
        self.endpoints.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(index)
    }

    pub(crate) fn rearm_all(&mut self) {
        self.endpoints.iter_mut().for_each(Endpoint::rearm);
    }

    pub fn addresses(&self) -> Vec<IpAddr> {
        self.endpoints.iter().map(Endpoint::address).collect()
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| {
                let role = if index == 0 {
                    EndpointRole::Preferred
                } else {
                    EndpointRole::Alternate
                };
                endpoint.status(role)
            })
            .collect()
    }
}

/// Resolves the logical URL's host and builds the endpoint set.
pub async fn resolve_endpoints<R: Rng + Send + ?Sized>(
    url: &Url,
    config: &CommunicationConfig,
    resolver: &dyn HostResolver,
    rng: &mut R,
) -> Result<EndpointSet, TransportError> {
    let host = url.host_str().ok_or_else(|| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".to_string(),
    })?;
    let port = url.port_or_known_default().unwrap_or(80);

    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let addresses = match literal.parse::<IpAddr>() {
        Ok(address) => vec![address],
        Err(_) => resolver.resolve(host, port).await?,
    };

    if addresses.is_empty() {
        return Err(TransportError::UnknownHost {
            host: host.to_string(),
            reason: "no addresses resolved".to_string(),
        });
    }

    debug!("Resolved {} to {:?}", host, addresses);
    let set = EndpointSet::from_addresses(addresses, config, rng);
    info!(
        "Using {} as preferred endpoint for {} with {} alternate(s)",
        set.preferred().address(),
        host,
        set.alternate_count()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn addresses(count: u8) -> Vec<IpAddr> {
        (1..=count).map(|i| IpAddr::from([10, 0, 0, i])).collect()
    }

    #[test]
    fn test_single_endpoint_without_opt_in() {
        let mut rng = StdRng::seed_from_u64(1);
        let set = EndpointSet::from_addresses(addresses(3), &CommunicationConfig::default(), &mut rng);

        assert_eq!(set.len(), 1);
        assert!(set.alternates().is_empty());
        assert_eq!(set.preferred().address(), IpAddr::from([10, 0, 0, 1]));
    }

    #[test]
    fn test_alternates_are_a_permutation_of_the_rest() {
        let config = CommunicationConfig {
            supports_multi_endpoint: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let set = EndpointSet::from_addresses(addresses(6), &config, &mut rng);

        assert_eq!(set.preferred().address(), IpAddr::from([10, 0, 0, 1]));
        let mut alternates: Vec<IpAddr> = set.alternates().iter().map(|e| e.address()).collect();
        alternates.sort();
        assert_eq!(alternates, addresses(6)[1..].to_vec());
    }

    #[test]
    fn test_shuffle_varies_alternate_order() {
        let config = CommunicationConfig {
            supports_multi_endpoint: true,
            ..Default::default()
        };
        let orders: std::collections::HashSet<Vec<IpAddr>> = (0..20)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                EndpointSet::from_addresses(addresses(5), &config, &mut rng)
                    .alternates()
                    .iter()
                    .map(|e| e.address())
                    .collect()
            })
            .collect();
        assert!(orders.len() > 1);
    }

    #[test]
    fn test_duplicate_addresses_collapsed() {
        let config = CommunicationConfig {
            supports_multi_endpoint: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut resolved = addresses(2);
        resolved.push(IpAddr::from([10, 0, 0, 1]));

        let set = EndpointSet::from_addresses(resolved, &config, &mut rng);
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn test_ip_literal_skips_resolver() {
        let mut rng = StdRng::seed_from_u64(1);
        let url = Url::parse("http://192.168.1.10:7080/lather").unwrap();
        let set = resolve_endpoints(&url, &CommunicationConfig::default(), &StaticResolver::new(), &mut rng)
            .await
            .unwrap();
        assert_eq!(set.preferred().address(), IpAddr::from([192, 168, 1, 10]));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_hosts() {
        let mut rng = StdRng::seed_from_u64(1);
        let resolver = StaticResolver::new().with_host("empty.example.com", vec![]);
        let config = CommunicationConfig::default();

        let url = Url::parse("http://missing.example.com/lather").unwrap();
        let err = resolve_endpoints(&url, &config, &resolver, &mut rng).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownHost { .. }));

        let url = Url::parse("http://empty.example.com/lather").unwrap();
        let err = resolve_endpoints(&url, &config, &resolver, &mut rng).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownHost { .. }));
    }
}
