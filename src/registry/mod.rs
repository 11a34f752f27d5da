//! Multi-network endpoint registry
//!
//! Holds, per logical network, the ordered candidate RPC and indexer
//! endpoints together with their health state. One registry instance is
//! constructed at startup and passed by reference to every client; the
//! health table is the only cross-request shared mutable state in the
//! process and resets on restart.
//!
//! Health transitions: any failure marks an endpoint `Degraded`; three
//! consecutive failures mark it `Dead`; one success resets to `Healthy`.
//! Degraded endpoints stay selectable but sort behind healthy ones.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::types::Network;

/// Consecutive failures after which an endpoint is considered dead
const DEAD_AFTER_FAILURES: u32 = 3;

/// What an endpoint serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Rpc,
    Indexer,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::Rpc => "rpc",
            EndpointKind::Indexer => "indexer",
        }
    }
}

/// Health state of a single endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Dead,
}

impl HealthState {
    /// Sort rank: healthy first, then untried, then flaky; dead is
    /// filtered before ranking matters.
    fn rank(self) -> u8 {
        match self {
            HealthState::Healthy => 0,
            HealthState::Unknown => 1,
            HealthState::Degraded => 2,
            HealthState::Dead => 3,
        }
    }
}

/// Stable identity of an endpoint within the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(Arc<str>);

/// A resolved endpoint candidate
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub network: Network,
    pub kind: EndpointKind,
    pub url: String,
    /// Declared position in the configured candidate list (0 = preferred)
    pub priority: usize,
}

#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    state: HealthState,
    consecutive_failures: u32,
}

impl Default for HealthEntry {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
        }
    }
}

/// Per-process endpoint registry
pub struct EndpointRegistry {
    /// Candidate lists, fixed at construction
    endpoints: HashMap<(Network, EndpointKind), Vec<Endpoint>>,

    /// Mutable health table; last-write-wins is acceptable since health
    /// is an approximation, not a correctness-critical value
    health: RwLock<HashMap<EndpointId, HealthEntry>>,
}

impl EndpointRegistry {
    /// Build the registry from startup configuration
    pub fn from_config(config: &Config) -> GatewayResult<Self> {
        let mut endpoints: HashMap<(Network, EndpointKind), Vec<Endpoint>> = HashMap::new();

        for (name, network_config) in &config.networks {
            let network = Network::parse(name)?;
            if network_config.rpc.is_empty() {
                return Err(GatewayError::Configuration(format!(
                    "network '{name}' has no rpc endpoints"
                )));
            }

            for (kind, urls) in [
                (EndpointKind::Rpc, &network_config.rpc),
                (EndpointKind::Indexer, &network_config.indexer),
            ] {
                let candidates = urls
                    .iter()
                    .enumerate()
                    .map(|(priority, url)| Endpoint {
                        id: EndpointId(Arc::from(format!(
                            "{}/{}/{}",
                            network.name(),
                            kind.as_str(),
                            url
                        ))),
                        network: network.clone(),
                        kind,
                        url: url.clone(),
                        priority,
                    })
                    .collect();
                endpoints.insert((network.clone(), kind), candidates);
            }
        }

        Ok(Self {
            endpoints,
            health: RwLock::new(HashMap::new()),
        })
    }

    /// Names of all configured networks, sorted
    pub fn known_networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .endpoints
            .keys()
            .map(|(network, _)| network.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Validate a caller-supplied network string against the configured set
    pub fn validate_network(&self, name: &str) -> GatewayResult<Network> {
        let network = Network::parse(name)?;
        if !self
            .endpoints
            .contains_key(&(network.clone(), EndpointKind::Rpc))
        {
            return Err(GatewayError::UnknownNetwork {
                name: network.name().to_string(),
                known: self.known_networks().join(", "),
            });
        }
        Ok(network)
    }

    /// Resolve the best live endpoint for a network
    ///
    /// Stable sort by health rank then declared priority; dead endpoints
    /// are never returned.
    pub fn resolve(&self, network: &Network, kind: EndpointKind) -> GatewayResult<Endpoint> {
        let candidates = self
            .endpoints
            .get(&(network.clone(), kind))
            .filter(|list| !list.is_empty())
            .ok_or_else(|| GatewayError::UnknownNetwork {
                name: network.name().to_string(),
                known: self.known_networks().join(", "),
            })?;

        let health = self.health.read();
        let mut live: Vec<(&Endpoint, HealthState)> = candidates
            .iter()
            .map(|ep| {
                let state = health
                    .get(&ep.id)
                    .map(|entry| entry.state)
                    .unwrap_or(HealthState::Unknown);
                (ep, state)
            })
            .filter(|(_, state)| *state != HealthState::Dead)
            .collect();
        drop(health);

        live.sort_by_key(|(ep, state)| (state.rank(), ep.priority));

        match live.first() {
            Some((endpoint, state)) => {
                debug!(
                    network = %network,
                    kind = kind.as_str(),
                    url = %endpoint.url,
                    health = ?state,
                    "Resolved endpoint"
                );
                Ok((*endpoint).clone())
            }
            None => {
                warn!(
                    network = %network,
                    kind = kind.as_str(),
                    "All candidate endpoints are dead"
                );
                Err(GatewayError::NoEndpointAvailable {
                    network: network.name().to_string(),
                    kind: kind.as_str().to_string(),
                })
            }
        }
    }

    /// Record the outcome of a request against an endpoint
    ///
    /// Success resets the failure streak and marks the endpoint healthy;
    /// each failure degrades it, the third consecutive one kills it.
    pub fn report(&self, endpoint: &Endpoint, success: bool) {
        let mut health = self.health.write();
        let entry = health.entry(endpoint.id.clone()).or_default();
        let old_state = entry.state;

        if success {
            entry.consecutive_failures = 0;
            entry.state = HealthState::Healthy;
        } else {
            entry.consecutive_failures += 1;
            entry.state = if entry.consecutive_failures >= DEAD_AFTER_FAILURES {
                HealthState::Dead
            } else {
                HealthState::Degraded
            };
        }

        if entry.state != old_state {
            info!(
                url = %endpoint.url,
                old = ?old_state,
                new = ?entry.state,
                failures = entry.consecutive_failures,
                "Endpoint health changed"
            );
            crate::metrics::metrics()
                .endpoint_health_transitions
                .inc();
        }
    }

    /// Current health of an endpoint
    pub fn health_of(&self, endpoint: &Endpoint) -> HealthState {
        self.health
            .read()
            .get(&endpoint.id)
            .map(|entry| entry.state)
            .unwrap_or(HealthState::Unknown)
    }
}
