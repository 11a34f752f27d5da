//! Shared test fixtures: an in-memory chain backend for lifecycle tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use tezgate::chain::{
    BlockHeader, ChainRpc, ContentSimulation, ProtocolConstants, SimulationResult,
};
use tezgate::error::{GatewayError, GatewayResult};
use tezgate::forge::base58::{self, Prefix};
use tezgate::forge::zarith;
use tezgate::types::{AccountRef, Mutez};

pub const GENESIS_LEVEL: i64 = 1_000;
pub const BASE_COUNTER: u64 = 41;

/// Scripted verdict for `simulate`
#[derive(Debug, Clone)]
pub enum SimulationScript {
    /// Every content applies with this milligas consumption
    Applied { milligas_per_content: u64 },
    /// The dry run reports a script failure with this error payload
    Failed { error: String },
}

/// In-memory chain with scriptable failure modes
pub struct MockChain {
    pub head_level: AtomicI64,
    counters: Mutex<HashMap<String, u64>>,
    revealed: Mutex<HashSet<String>>,
    simulation: Mutex<SimulationScript>,
    /// Transient transport failures to serve before injection succeeds
    pub inject_transient_failures: AtomicU32,
    /// Reject every injection outright (non-retryable)
    pub reject_injection: AtomicBool,
    /// Whether injected operations get baked into a block
    pub auto_include: AtomicBool,
    /// Every injection attempt payload, failed attempts included
    pub inject_attempts: Mutex<Vec<String>>,
    pub simulate_calls: AtomicU32,
    blocks: Mutex<HashMap<i64, Vec<String>>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            head_level: AtomicI64::new(GENESIS_LEVEL),
            counters: Mutex::new(HashMap::new()),
            revealed: Mutex::new(HashSet::new()),
            simulation: Mutex::new(SimulationScript::Applied {
                milligas_per_content: 1_420_000,
            }),
            inject_transient_failures: AtomicU32::new(0),
            reject_injection: AtomicBool::new(false),
            auto_include: AtomicBool::new(true),
            inject_attempts: Mutex::new(Vec::new()),
            simulate_calls: AtomicU32::new(0),
            blocks: Mutex::new(HashMap::new()),
        }
    }

    pub fn script_simulation(&self, script: SimulationScript) {
        *self.simulation.lock().unwrap() = script;
    }

    pub fn mark_revealed(&self, account: &AccountRef) {
        self.revealed.lock().unwrap().insert(account.to_string());
    }

    pub fn counter_of(&self, account: &AccountRef) -> u64 {
        *self
            .counters
            .lock()
            .unwrap()
            .get(account.as_str())
            .unwrap_or(&BASE_COUNTER)
    }

    pub fn injected_count(&self) -> usize {
        self.inject_attempts.lock().unwrap().len()
    }

    fn head_hash(&self) -> String {
        base58::encode(Prefix::Block, &[7u8; 32])
    }
}

/// Parse (kind tag, counter) pairs out of forged group bytes
///
/// Walks the envelope of each content: tag, 21-byte source, then
/// fee/counter/gas/storage naturals. Reveal payloads have a fixed size so
/// the walk can continue to the main content; parsing stops at the first
/// non-reveal content.
pub fn parse_forged_counters(bytes: &[u8]) -> Vec<(u8, u64)> {
    let mut parsed = Vec::new();
    let mut rest = &bytes[32..]; // skip branch hash

    loop {
        let Some((&tag, after_tag)) = rest.split_first() else {
            break;
        };
        let after_source = &after_tag[21..];
        let (_fee, after_fee) = zarith::get_nat(after_source).expect("fee");
        let (counter, after_counter) = zarith::get_nat(after_fee).expect("counter");
        let (_gas, after_gas) = zarith::get_nat(after_counter).expect("gas");
        let (_storage, after_storage) = zarith::get_nat(after_gas).expect("storage");
        parsed.push((tag, counter));

        if tag == 107 {
            // reveal payload: curve tag + 32-byte ed25519 key
            rest = &after_storage[33..];
        } else {
            break;
        }
    }
    parsed
}

/// Source address of the first content (assumes a tz1 source)
pub fn parse_forged_source(bytes: &[u8]) -> String {
    // branch(32) + tag(1) + curve tag(1) + 20-byte hash
    base58::encode(Prefix::Tz1, &bytes[34..54])
}

#[async_trait]
impl ChainRpc for MockChain {
    fn endpoint_url(&self) -> &str {
        "mock://chain"
    }

    async fn head(&self) -> GatewayResult<BlockHeader> {
        Ok(BlockHeader {
            protocol: "PtTestProtocolHashForGatewayTests".to_string(),
            chain_id: "NetXnHfVqm9iesp".to_string(),
            hash: self.head_hash(),
            level: self.head_level.load(Ordering::SeqCst),
            timestamp: chrono::Utc::now(),
        })
    }

    async fn chain_id(&self) -> GatewayResult<String> {
        Ok("NetXnHfVqm9iesp".to_string())
    }

    async fn counter(&self, account: &AccountRef) -> GatewayResult<u64> {
        Ok(self.counter_of(account))
    }

    async fn balance(&self, _account: &AccountRef) -> GatewayResult<Mutez> {
        Ok(Mutez(10_000_000))
    }

    async fn manager_key(&self, account: &AccountRef) -> GatewayResult<Option<String>> {
        let revealed = self.revealed.lock().unwrap().contains(account.as_str());
        Ok(revealed.then(|| base58::encode(Prefix::Edpk, &[5u8; 32])))
    }

    async fn constants(&self) -> GatewayResult<ProtocolConstants> {
        Ok(ProtocolConstants {
            hard_gas_limit_per_operation: 1_040_000,
            hard_storage_limit_per_operation: 60_000,
            cost_per_byte: 250,
            minimal_block_delay: Some(8),
        })
    }

    async fn simulate(
        &self,
        _branch: &str,
        contents: &[Value],
        _chain_id: &str,
    ) -> GatewayResult<SimulationResult> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);

        match self.simulation.lock().unwrap().clone() {
            SimulationScript::Applied {
                milligas_per_content,
            } => Ok(SimulationResult {
                applied: true,
                contents: contents
                    .iter()
                    .map(|_| ContentSimulation {
                        consumed_milligas: milligas_per_content,
                        paid_storage_size_diff: 0,
                        allocated_destination_contract: false,
                    })
                    .collect(),
                error: None,
            }),
            SimulationScript::Failed { error } => Ok(SimulationResult {
                applied: false,
                contents: Vec::new(),
                error: Some(error),
            }),
        }
    }

    async fn inject(&self, signed_hex: &str) -> GatewayResult<String> {
        self.inject_attempts
            .lock()
            .unwrap()
            .push(signed_hex.to_string());

        if self.reject_injection.load(Ordering::SeqCst) {
            return Err(GatewayError::InjectionRejected {
                endpoint: "mock://chain".to_string(),
                reason: "counter in the past".to_string(),
            });
        }

        if self
            .inject_transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Transport {
                endpoint: "mock://chain".to_string(),
                message: "connection reset by peer".to_string(),
            });
        }

        let bytes = hex::decode(signed_hex).map_err(|e| GatewayError::Internal(e.to_string()))?;
        let forged = &bytes[..bytes.len() - 64];
        let hash = tezgate::forge::operation_hash(&bytes);

        // The mempool view of the counter advances on acceptance
        if let Some((_, counter)) = parse_forged_counters(forged).last() {
            let source = parse_forged_source(forged);
            self.counters.lock().unwrap().insert(source, *counter);
        }

        if self.auto_include.load(Ordering::SeqCst) {
            let level = self.head_level.fetch_add(1, Ordering::SeqCst) + 1;
            self.blocks
                .lock()
                .unwrap()
                .entry(level)
                .or_default()
                .push(hash.clone());
        }

        Ok(hash)
    }

    async fn operation_hashes(&self, level: i64) -> GatewayResult<Vec<String>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&level)
            .cloned()
            .unwrap_or_default())
    }
}
