//! Transaction lifecycle orchestration
//!
//! The state machine per submitted request:
//!
//! ```text
//! Built → Simulated → Signed → Injected → {Confirmed | Failed | TimedOut}
//! ```
//!
//! Simulation failures and node rejections are terminal and surfaced
//! verbatim. Transient transport failures retry with bounded exponential
//! backoff; injection retries always reuse the same signed bytes, so the
//! operation hash never changes across attempts. A deadline accompanies
//! every invocation: expiry before injection aborts cleanly, expiry after
//! injection returns the hash for later follow-up.

pub mod sequencer;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::builder::OperationBuilder;
use crate::chain::ChainRpc;
use crate::config::Config;
use crate::error::{GatewayError, GatewayResult, RetryPolicy};
use crate::signer::Signer;
use crate::types::{ConfirmationReceipt, OperationRequest, OperationStatus};

pub use sequencer::AccountSequencer;

/// States of the per-request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Built,
    Simulated,
    Signed,
    Injected,
    Confirmed,
    Failed,
    TimedOut,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Built => "built",
            LifecycleState::Simulated => "simulated",
            LifecycleState::Signed => "signed",
            LifecycleState::Injected => "injected",
            LifecycleState::Confirmed => "confirmed",
            LifecycleState::Failed => "failed",
            LifecycleState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Successful (or still-pending) outcome of a submission
///
/// `Failed` never appears here: terminal failures surface as errors with
/// their structured reason.
#[derive(Debug, Clone)]
pub struct Submission {
    /// `Confirmed`, or `TimedOut` when inclusion was not observed in time
    pub state: LifecycleState,

    /// Hash to re-query with; identical across injection retries
    pub operation_hash: String,

    pub receipt: ConfirmationReceipt,
}

/// Keeps the in-flight gauge honest across early returns
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        crate::metrics::metrics().inflight_operations.inc();
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        crate::metrics::metrics().inflight_operations.dec();
    }
}

/// Drives one request through the lifecycle against one chain client
pub struct Orchestrator {
    chain: Arc<dyn ChainRpc>,
    builder: OperationBuilder,
    signer: Arc<Signer>,
    sequencer: Arc<AccountSequencer>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        signer: Arc<Signer>,
        sequencer: Arc<AccountSequencer>,
        config: &Config,
    ) -> Self {
        Self {
            builder: OperationBuilder::new(chain.clone(), config.fees.clone()),
            chain,
            signer,
            sequencer,
            retry: config.retry.policy(),
            poll_interval: Duration::from_millis(config.confirmation.poll_interval_ms),
        }
    }

    /// Submit a request and drive it to a terminal state
    ///
    /// `deadline` bounds the whole invocation. Dropping the returned
    /// future before injection has no chain-side effect; once injected,
    /// the operation is committed to the mempool and only local polling
    /// stops.
    #[instrument(skip(self, request), fields(kind = request.details.kind_name(), source = %request.source, network = %request.network))]
    pub async fn submit(
        &self,
        request: &OperationRequest,
        deadline: Duration,
    ) -> GatewayResult<Submission> {
        let metrics = crate::metrics::metrics();
        metrics.operations_submitted.inc();
        let _inflight = InflightGuard::new();

        let deadline_at = Instant::now() + deadline;

        // Same-source requests serialize from counter read through
        // injection; different sources proceed in parallel.
        let sequence_guard = self
            .sequencer
            .acquire(&request.network, &request.source)
            .await;

        // Built → Simulated: build with fresh counter, simulation-derived
        // limits and a confirming re-simulation
        let build_started = Instant::now();
        let forged = {
            let mut attempt = 0;
            loop {
                match self.builder.build(request, &self.signer.public_key()).await {
                    Ok(forged) => break forged,
                    Err(err) if err.is_retryable() => match self.retry.calculate_delay(attempt) {
                        Some(delay) => {
                            warn!(attempt, error = %err, "Build attempt failed, backing off");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            metrics.operations_failed.inc();
                            return Err(GatewayError::NoEndpointAvailable {
                                network: request.network.name().to_string(),
                                kind: "rpc".to_string(),
                            });
                        }
                    },
                    Err(err) => {
                        metrics.operations_failed.inc();
                        info!(error = %err, category = err.category(), "Request failed before signing");
                        return Err(err);
                    }
                }
            }
        };
        metrics
            .build_latency
            .observe(build_started.elapsed().as_secs_f64());
        debug!(
            branch = %forged.branch,
            contents = forged.contents.len(),
            "Operation forged"
        );

        if Instant::now() >= deadline_at {
            metrics.operations_timed_out.inc();
            return Err(GatewayError::TimedOut {
                operation_hash: None,
            });
        }

        // Simulated → Signed: pure local signing over the forged bytes
        let signed = self.signer.sign_forged(forged);
        debug!(operation_hash = %signed.operation_hash, "Operation signed");

        // Signed → Injected: bounded retries, always the same signed bytes
        let inject_started = Instant::now();
        let injection_hex = signed.injection_hex();
        let from_level = match self.chain.head().await {
            Ok(header) => header.level,
            Err(_) => 0,
        };

        let mut attempt = 0;
        let operation_hash = loop {
            if Instant::now() >= deadline_at {
                metrics.operations_timed_out.inc();
                return Err(GatewayError::TimedOut {
                    operation_hash: None,
                });
            }

            match self.chain.inject(&injection_hex).await {
                Ok(hash) => {
                    if hash != signed.operation_hash {
                        warn!(
                            local = %signed.operation_hash,
                            node = %hash,
                            "Node-derived operation hash differs from local one"
                        );
                    }
                    break hash;
                }
                Err(err) if err.is_retryable() => match self.retry.calculate_delay(attempt) {
                    Some(delay) => {
                        metrics.injection_retries.inc();
                        warn!(attempt, error = %err, "Injection attempt failed, backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        metrics.operations_failed.inc();
                        return Err(GatewayError::NoEndpointAvailable {
                            network: request.network.name().to_string(),
                            kind: "rpc".to_string(),
                        });
                    }
                },
                Err(err) => {
                    metrics.operations_failed.inc();
                    info!(error = %err, "Injection rejected");
                    return Err(err);
                }
            }
        };
        metrics
            .inject_latency
            .observe(inject_started.elapsed().as_secs_f64());
        info!(operation_hash = %operation_hash, "Operation injected");

        // The counter is consumed once the mempool holds the operation;
        // the next same-source request may proceed.
        drop(sequence_guard);

        // Injected → Confirmed | TimedOut
        let confirm_started = Instant::now();
        let receipt = self
            .chain
            .await_inclusion(&operation_hash, from_level, deadline_at, self.poll_interval)
            .await?;

        match receipt.status {
            OperationStatus::Included => {
                metrics.operations_confirmed.inc();
                metrics
                    .confirm_latency
                    .observe(confirm_started.elapsed().as_secs_f64());
                info!(
                    operation_hash = %operation_hash,
                    level = receipt.included_in_block,
                    "Operation confirmed"
                );
                Ok(Submission {
                    state: LifecycleState::Confirmed,
                    operation_hash,
                    receipt,
                })
            }
            OperationStatus::Pending => {
                metrics.operations_timed_out.inc();
                warn!(
                    operation_hash = %operation_hash,
                    "Inclusion not observed before deadline; hash returned for follow-up"
                );
                Ok(Submission {
                    state: LifecycleState::TimedOut,
                    operation_hash,
                    receipt,
                })
            }
            OperationStatus::Failed => {
                metrics.operations_failed.inc();
                Err(GatewayError::InjectionRejected {
                    endpoint: self.chain.endpoint_url().to_string(),
                    reason: receipt
                        .error
                        .unwrap_or_else(|| "operation failed in block".to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_state_display() {
        assert_eq!(LifecycleState::Built.to_string(), "built");
        assert_eq!(LifecycleState::TimedOut.to_string(), "timed_out");
        assert_eq!(LifecycleState::Confirmed.to_string(), "confirmed");
    }

    #[test]
    fn lifecycle_state_serializes_snake_case() {
        let json = serde_json::to_string(&LifecycleState::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
