//! Operation builder: from typed request to forged group
//!
//! The build path, in order: fresh counter from the chain (never cached),
//! kind-specific content construction, a placeholder-limit dry run,
//! limits and fee derived from the simulation plus configured headroom,
//! and a confirming re-simulation with the final values. A request that
//! fails its dry run never reaches a signer.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::chain::{ChainRpc, SimulationResult};
use crate::config::FeeConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::forge::micheline::Micheline;
use crate::forge::{ForgedOperation, Limits, OperationContent};
use crate::security;
use crate::types::{AddressKind, Mutez, OperationDetails, OperationRequest};

/// Storage bytes burned when a transfer allocates its destination
const ALLOCATION_STORAGE_BYTES: u64 = 257;

/// Signature length added to forged bytes at injection
const SIGNATURE_BYTES: u64 = 64;

/// Builds forged operation groups against one chain client
pub struct OperationBuilder {
    chain: Arc<dyn ChainRpc>,
    fees: FeeConfig,
}

impl OperationBuilder {
    pub fn new(chain: Arc<dyn ChainRpc>, fees: FeeConfig) -> Self {
        Self { chain, fees }
    }

    /// Build and forge an operation group for `request`
    ///
    /// `public_key` is the source's edpk key, needed when the account has
    /// not yet revealed it on chain.
    #[instrument(skip(self, request, public_key), fields(kind = request.details.kind_name(), source = %request.source))]
    pub async fn build(
        &self,
        request: &OperationRequest,
        public_key: &str,
    ) -> GatewayResult<ForgedOperation> {
        validate_request(request)?;

        let head = self.chain.head().await?;
        let constants = self.chain.constants().await?;

        // Fresh counter from the current head, +1 for the next operation;
        // a cached value would race concurrent requests from this source.
        let base_counter = self.chain.counter(&request.source).await?;

        let needs_reveal = self.chain.manager_key(&request.source).await?.is_none();
        let content_count = if needs_reveal { 2u64 } else { 1 };

        // Placeholder limits split the per-group hard caps across contents
        let placeholder_gas = constants.hard_gas_limit_per_operation / content_count;
        let placeholder_storage = constants.hard_storage_limit_per_operation / content_count;

        let mut next_counter = base_counter + 1;
        let mut contents = Vec::with_capacity(content_count as usize);

        if needs_reveal {
            contents.push(OperationContent::Reveal {
                source: request.source.clone(),
                public_key: public_key.to_string(),
                limits: Limits::placeholder(next_counter, placeholder_gas, placeholder_storage),
            });
            next_counter += 1;
        }
        contents.push(build_main_content(
            request,
            Limits::placeholder(next_counter, placeholder_gas, placeholder_storage),
        )?);

        // First dry run discovers real consumption
        let simulation = self.simulate(&head.hash, &head.chain_id, &contents).await?;

        self.apply_limits(&mut contents, &simulation)?;

        let sizes = contents
            .iter()
            .map(estimate_content_size)
            .collect::<GatewayResult<Vec<_>>>()?;
        self.apply_fees(&sizes, &mut contents);

        // Confirming re-simulation with the final envelope values
        let confirmation = self.simulate(&head.hash, &head.chain_id, &contents).await?;
        debug!(
            gas = confirmation.total_gas_units(),
            contents = contents.len(),
            "Final simulation applied"
        );

        Ok(ForgedOperation::forge(&head.hash, contents)?)
    }

    async fn simulate(
        &self,
        branch: &str,
        chain_id: &str,
        contents: &[OperationContent],
    ) -> GatewayResult<SimulationResult> {
        let rpc_contents: Vec<_> = contents.iter().map(OperationContent::to_rpc_json).collect();
        let result = self.chain.simulate(branch, &rpc_contents, chain_id).await?;

        if !result.applied {
            crate::metrics::metrics().simulations_failed.inc();
            return Err(GatewayError::SimulationFailed {
                details: result
                    .error
                    .unwrap_or_else(|| "dry run not applied".to_string()),
            });
        }
        Ok(result)
    }

    /// Set gas/storage limits from simulated consumption plus headroom
    fn apply_limits(
        &self,
        contents: &mut [OperationContent],
        simulation: &SimulationResult,
    ) -> GatewayResult<()> {
        if simulation.contents.len() != contents.len() {
            return Err(GatewayError::internal(format!(
                "simulation returned {} results for {} contents",
                simulation.contents.len(),
                contents.len()
            )));
        }

        for (content, result) in contents.iter_mut().zip(&simulation.contents) {
            let gas = with_headroom(result.gas_units(), self.fees.headroom_pct);
            let mut storage = result.paid_storage_size_diff;
            if result.allocated_destination_contract {
                storage += ALLOCATION_STORAGE_BYTES;
            }
            let storage = with_headroom(storage, self.fees.headroom_pct);

            let limits = content.limits_mut();
            limits.gas_limit = gas;
            limits.storage_limit = storage;
        }
        Ok(())
    }

    /// Derive each content's fee from its size and final gas limit
    fn apply_fees(&self, sizes: &[u64], contents: &mut [OperationContent]) {
        let share = SIGNATURE_BYTES / contents.len().max(1) as u64;
        for (content, size) in contents.iter_mut().zip(sizes) {
            let limits = content.limits_mut();
            let gas_fee =
                (limits.gas_limit * self.fees.nanotez_per_gas_unit).div_ceil(1000);
            let byte_fee = (size + share) * self.fees.fee_per_byte_mutez;
            let fee = self.fees.minimal_fee_mutez + byte_fee + gas_fee;
            limits.fee = Mutez(with_headroom(fee, self.fees.headroom_pct));
        }
    }
}

/// Forged size of a single content, fee field still zeroed
fn estimate_content_size(content: &OperationContent) -> GatewayResult<u64> {
    let mut bytes = Vec::new();
    content.forge_into(&mut bytes)?;
    Ok(bytes.len() as u64)
}

fn with_headroom(value: u64, headroom_pct: u64) -> u64 {
    value + (value * headroom_pct).div_ceil(100)
}

/// Construct the kind-specific content for a request
fn build_main_content(
    request: &OperationRequest,
    limits: Limits,
) -> GatewayResult<OperationContent> {
    let source = request.source.clone();
    Ok(match &request.details {
        OperationDetails::Transfer {
            destination,
            amount,
        } => OperationContent::Transaction {
            source,
            destination: destination.clone(),
            amount: *amount,
            entry_point: None,
            parameters: None,
            limits,
        },
        OperationDetails::Call {
            destination,
            entry_point,
            parameters,
            amount,
        } => OperationContent::Transaction {
            source,
            destination: destination.clone(),
            amount: *amount,
            entry_point: Some(entry_point.clone()),
            parameters: Some(parameters.clone().unwrap_or_else(Micheline::unit)),
            limits,
        },
        OperationDetails::Originate {
            code,
            storage,
            balance,
        } => OperationContent::Origination {
            source,
            balance: *balance,
            code: code.clone(),
            storage: storage.clone(),
            limits,
        },
        OperationDetails::Delegate { delegate } => OperationContent::Delegation {
            source,
            delegate: delegate.clone(),
            limits,
        },
    })
}

/// Shape checks that need no chain state
fn validate_request(request: &OperationRequest) -> GatewayResult<()> {
    if request.source.kind() != AddressKind::Implicit {
        return Err(GatewayError::validation(format!(
            "source must be an implicit account: {}",
            request.source
        )));
    }

    match &request.details {
        OperationDetails::Transfer { amount, .. } => {
            security::validate_amount(amount.get())?;
        }
        OperationDetails::Call {
            destination,
            entry_point,
            amount,
            ..
        } => {
            security::validate_entry_point(entry_point)?;
            security::validate_amount(amount.get())?;
            if destination.kind() != AddressKind::Contract {
                return Err(GatewayError::validation(format!(
                    "call destination must be a contract: {destination}"
                )));
            }
        }
        OperationDetails::Originate { balance, .. } => {
            security::validate_amount(balance.get())?;
        }
        OperationDetails::Delegate { delegate } => {
            if let Some(delegate) = delegate {
                if delegate.kind() != AddressKind::Implicit {
                    return Err(GatewayError::validation(format!(
                        "delegate must be an implicit account: {delegate}"
                    )));
                }
            }
        }
    }
    Ok(())
}
