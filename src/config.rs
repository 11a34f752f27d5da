//! Configuration for the gateway core
//!
//! Loaded once at process start from a TOML file (plus optional
//! `TEZOS_<NETWORK>_NODE` environment overrides) and never hot-reloaded
//! mid-request. Holds the network → endpoint map and the fee, retry and
//! confirmation knobs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RetryPolicy;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network name → ordered endpoint candidates
    pub networks: HashMap<String, NetworkConfig>,

    /// RPC transport configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Fee and limit estimation
    #[serde(default)]
    pub fees: FeeConfig,

    /// Retry/backoff for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Confirmation polling
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Indexer read path
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// Ordered endpoint lists for one network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// RPC node URLs, highest priority first
    pub rpc: Vec<String>,

    /// Indexer URLs, highest priority first
    #[serde(default)]
    pub indexer: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Safety margin applied to simulated gas/storage limits, in percent
    ///
    /// Under-provisioning causes injection rejections, over-provisioning
    /// wastes fee; tune per deployment.
    #[serde(default = "default_headroom_pct")]
    pub headroom_pct: u64,

    /// Flat fee floor in mutez
    #[serde(default = "default_minimal_fee")]
    pub minimal_fee_mutez: u64,

    /// Fee per forged byte (signature included) in mutez
    #[serde(default = "default_fee_per_byte")]
    pub fee_per_byte_mutez: u64,

    /// Fee per consumed gas unit in nanotez
    #[serde(default = "default_nanotez_per_gas")]
    pub nanotez_per_gas_unit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Interval between inclusion polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Default inclusion deadline in seconds
    #[serde(default = "default_confirm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// How long after chain inclusion an operation may legitimately be
    /// missing from the indexer
    #[serde(default = "default_lag_grace")]
    pub lag_grace_secs: u64,
}

// Default value functions
fn default_rpc_timeout() -> u64 {
    30
}
fn default_headroom_pct() -> u64 {
    10
}
fn default_minimal_fee() -> u64 {
    100
}
fn default_fee_per_byte() -> u64 {
    1
}
fn default_nanotez_per_gas() -> u64 {
    100
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_confirm_timeout() -> u64 {
    120
}
fn default_lag_grace() -> u64 {
    60
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            headroom_pct: default_headroom_pct(),
            minimal_fee_mutez: default_minimal_fee(),
            fee_per_byte_mutez: default_fee_per_byte(),
            nanotez_per_gas_unit: default_nanotez_per_gas(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_confirm_timeout(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            lag_grace_secs: default_lag_grace(),
        }
    }
}

impl RetryConfig {
    /// Materialize the backoff driver
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_factor: self.jitter_factor,
            multiplier: self.multiplier,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `TEZOS_<NETWORK>_NODE` environment overrides
    ///
    /// An override becomes the highest-priority RPC candidate for its
    /// network, ahead of the file-configured list.
    pub fn apply_env_overrides(&mut self) {
        for (name, network) in self.networks.iter_mut() {
            let var = format!(
                "TEZOS_{}_NODE",
                name.to_uppercase().replace('-', "_")
            );
            if let Ok(url) = std::env::var(&var) {
                if !url.is_empty() && !network.rpc.contains(&url) {
                    network.rpc.insert(0, url);
                }
            }
        }
    }

    /// Reject configurations that could never serve a request
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.networks.is_empty() {
            anyhow::bail!("no networks configured");
        }
        for (name, network) in &self.networks {
            if network.rpc.is_empty() {
                anyhow::bail!("network '{name}' has no rpc endpoints");
            }
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.fees.headroom_pct > 1000 {
            anyhow::bail!("fees.headroom_pct out of range: {}", self.fees.headroom_pct);
        }
        Ok(())
    }
}

impl Default for Config {
    /// Defaults matching the public networks (teztnets + TzKT)
    fn default() -> Self {
        let mut networks = HashMap::new();
        networks.insert(
            "mainnet".to_string(),
            NetworkConfig {
                rpc: vec!["https://mainnet.api.tez.ie".to_string()],
                indexer: vec!["https://api.tzkt.io".to_string()],
            },
        );
        networks.insert(
            "shadownet".to_string(),
            NetworkConfig {
                rpc: vec!["https://rpc.shadownet.teztnets.com".to_string()],
                indexer: vec!["https://api.shadownet.tzkt.io".to_string()],
            },
        );
        networks.insert(
            "ghostnet".to_string(),
            NetworkConfig {
                rpc: vec!["https://rpc.ghostnet.teztnets.com".to_string()],
                indexer: vec!["https://api.ghostnet.tzkt.io".to_string()],
            },
        );

        Self {
            networks,
            rpc: RpcConfig::default(),
            fees: FeeConfig::default(),
            retry: RetryConfig::default(),
            confirmation: ConfirmationConfig::default(),
            indexer: IndexerConfig::default(),
        }
    }
}
