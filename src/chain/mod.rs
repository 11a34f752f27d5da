//! Chain client: typed access to one RPC endpoint
//!
//! The [`ChainRpc`] trait is the seam between the orchestrator and the
//! node: production code talks to [`HttpChainClient`], tests substitute
//! an in-memory chain. `simulate` never mutates chain state and is called
//! before every injection.

pub mod http;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::error::GatewayResult;
use crate::types::{AccountRef, ConfirmationReceipt, Mutez, OperationStatus};

pub use http::HttpChainClient;
pub use types::{BlockHeader, ContentSimulation, ProtocolConstants, SimulationResult};

/// Low-level typed access to one RPC endpoint
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// URL of the endpoint this client is bound to
    fn endpoint_url(&self) -> &str;

    /// Shell header of the current head block
    async fn head(&self) -> GatewayResult<BlockHeader>;

    /// Chain id used by simulation requests
    async fn chain_id(&self) -> GatewayResult<String>;

    /// Last used counter of an account
    ///
    /// The next operation must use this value + 1.
    async fn counter(&self, account: &AccountRef) -> GatewayResult<u64>;

    /// Spendable balance of an account
    async fn balance(&self, account: &AccountRef) -> GatewayResult<Mutez>;

    /// Revealed public key of an account, `None` when unrevealed
    async fn manager_key(&self, account: &AccountRef) -> GatewayResult<Option<String>>;

    /// Protocol constants of the head context
    async fn constants(&self) -> GatewayResult<ProtocolConstants>;

    /// Dry-run an operation group against current chain state
    ///
    /// `contents` is the RPC-JSON form of the group. Never mutates chain
    /// state; must be called before every injection.
    async fn simulate(
        &self,
        branch: &str,
        contents: &[Value],
        chain_id: &str,
    ) -> GatewayResult<SimulationResult>;

    /// Submit hex-encoded signed bytes to the mempool
    ///
    /// Returns the operation hash the node derived. Outright rejections
    /// surface as `InjectionRejected` and are non-retryable; transport
    /// failures are retryable.
    async fn inject(&self, signed_hex: &str) -> GatewayResult<String>;

    /// Hashes of all operations in the block at `level`
    async fn operation_hashes(&self, level: i64) -> GatewayResult<Vec<String>>;

    /// Poll for inclusion of an operation until `deadline`
    ///
    /// Scans block operation hashes forward from `from_level` (a
    /// non-positive value anchors the scan at the first observed head).
    /// Returns an `Included` receipt on success or a still-`Pending`
    /// receipt when the deadline passes; transient poll errors are
    /// tolerated until then.
    async fn await_inclusion(
        &self,
        operation_hash: &str,
        from_level: i64,
        deadline: Instant,
        poll_interval: Duration,
    ) -> GatewayResult<ConfirmationReceipt> {
        let mut next_level = from_level;

        loop {
            let head_level = match self.head().await {
                Ok(header) => {
                    if next_level <= 0 {
                        next_level = header.level;
                    }
                    header.level
                }
                Err(err) if err.is_retryable() => {
                    debug!(error = %err, "head poll failed, will retry");
                    next_level - 1 // nothing new to scan this round
                }
                Err(err) => return Err(err),
            };

            while next_level <= head_level {
                match self.operation_hashes(next_level).await {
                    Ok(hashes) => {
                        if hashes.iter().any(|h| h == operation_hash) {
                            return Ok(ConfirmationReceipt {
                                operation_hash: operation_hash.to_string(),
                                included_in_block: Some(next_level),
                                status: OperationStatus::Included,
                                error: None,
                            });
                        }
                        next_level += 1;
                    }
                    Err(err) if err.is_retryable() => {
                        debug!(level = next_level, error = %err, "block scan failed, will retry");
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            if Instant::now() + poll_interval > deadline {
                return Ok(ConfirmationReceipt::pending(operation_hash));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
