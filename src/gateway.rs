//! Gateway facade: the operation-request interface
//!
//! The excluded tool-dispatch layer talks to the core exclusively through
//! this type: [`Gateway::execute`] for writes, [`Gateway::query`] for
//! reads, plus message signing. Construction wires the endpoint registry,
//! clients, signer and orchestrator together once per process.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::chain::{ChainRpc, HttpChainClient};
use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::indexer::{IndexedBlock, IndexedOperation, IndexerClient};
use crate::orchestrator::{AccountSequencer, Orchestrator, Submission};
use crate::registry::{EndpointKind, EndpointRegistry};
use crate::signer::Signer;
use crate::types::{
    AccountRef, Mutez, Network, OperationRequest, QueryRequest,
};

/// Typed responses of the read path
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResponse {
    Balance {
        network: Network,
        account: AccountRef,
        balance: Mutez,
    },

    ContractStorage {
        network: Network,
        contract: AccountRef,
        storage: Value,
    },

    Operations {
        network: Network,
        account: AccountRef,
        items: Vec<IndexedOperation>,
        /// Pass back to continue the scan; `None` on the last page
        next_cursor: Option<u64>,
    },

    BlockInfo {
        network: Network,
        block: IndexedBlock,
    },

    NetworkInfo {
        network: Network,
        chain_id: String,
        protocol: String,
        hard_gas_limit_per_operation: u64,
        hard_storage_limit_per_operation: u64,
        cost_per_byte: u64,
        minimal_block_delay: Option<u64>,
    },
}

/// Process-wide gateway instance
pub struct Gateway {
    config: Config,
    registry: Arc<EndpointRegistry>,
    sequencer: Arc<AccountSequencer>,
    signer: Option<Arc<Signer>>,
    http: reqwest::Client,
}

impl Gateway {
    /// Construct from startup configuration; no signer attached
    pub fn new(config: Config) -> GatewayResult<Self> {
        let registry = Arc::new(EndpointRegistry::from_config(&config)?);
        Ok(Self {
            config,
            registry,
            sequencer: Arc::new(AccountSequencer::new()),
            signer: None,
            http: reqwest::Client::new(),
        })
    }

    /// Attach the signing key used for write operations
    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// The registry backing this gateway (shared with all clients)
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        self.registry.clone()
    }

    fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.config.rpc.timeout_secs)
    }

    /// Resolve a chain client for a network
    fn chain_client(&self, network: &Network) -> GatewayResult<HttpChainClient> {
        let endpoint = self.registry.resolve(network, EndpointKind::Rpc)?;
        Ok(HttpChainClient::new(
            self.http.clone(),
            endpoint,
            self.registry.clone(),
            self.rpc_timeout(),
        ))
    }

    /// Resolve an indexer client for a network
    fn indexer_client(&self, network: &Network) -> GatewayResult<IndexerClient> {
        let endpoint = self.registry.resolve(network, EndpointKind::Indexer)?;
        Ok(IndexerClient::new(
            self.http.clone(),
            endpoint,
            self.registry.clone(),
            self.rpc_timeout(),
            Duration::from_secs(self.config.indexer.lag_grace_secs),
        ))
    }

    /// Submit a write operation with the configured default deadline
    pub async fn execute(&self, request: OperationRequest) -> GatewayResult<Submission> {
        let deadline = Duration::from_secs(self.config.confirmation.timeout_secs);
        self.execute_with_deadline(request, deadline).await
    }

    /// Submit a write operation with an explicit deadline
    pub async fn execute_with_deadline(
        &self,
        request: OperationRequest,
        deadline: Duration,
    ) -> GatewayResult<Submission> {
        let network = self.registry.validate_network(request.network.name())?;
        let signer = self
            .signer
            .clone()
            .ok_or_else(|| GatewayError::Signing("no signing key configured".to_string()))?;

        let chain: Arc<dyn ChainRpc> = Arc::new(self.chain_client(&network)?);
        let orchestrator =
            Orchestrator::new(chain, signer, self.sequencer.clone(), &self.config);
        orchestrator.submit(&request, deadline).await
    }

    /// Serve a read request from the chain or indexer backends
    pub async fn query(&self, request: QueryRequest) -> GatewayResult<QueryResponse> {
        let network = self.registry.validate_network(request.network().name())?;

        match request {
            QueryRequest::Balance { account, .. } => {
                let chain = self.chain_client(&network)?;
                let balance = chain.balance(&account).await?;
                Ok(QueryResponse::Balance {
                    network,
                    account,
                    balance,
                })
            }
            QueryRequest::ContractStorage { contract, .. } => {
                let indexer = self.indexer_client(&network)?;
                let storage = indexer.contract_storage(&contract).await?;
                Ok(QueryResponse::ContractStorage {
                    network,
                    contract,
                    storage,
                })
            }
            QueryRequest::Operations {
                account,
                limit,
                cursor,
                ..
            } => {
                let indexer = self.indexer_client(&network)?;
                let page = indexer.operations(&account, limit, cursor).await?;
                Ok(QueryResponse::Operations {
                    network,
                    account,
                    items: page.items,
                    next_cursor: page.next_cursor,
                })
            }
            QueryRequest::BlockInfo { level, .. } => {
                let indexer = self.indexer_client(&network)?;
                let block = indexer.block_info(level).await?;
                Ok(QueryResponse::BlockInfo { network, block })
            }
            QueryRequest::NetworkInfo { .. } => {
                let chain = self.chain_client(&network)?;
                let header = chain.head().await?;
                let chain_id = chain.chain_id().await?;
                let constants = chain.constants().await?;
                Ok(QueryResponse::NetworkInfo {
                    network,
                    chain_id,
                    protocol: header.protocol,
                    hard_gas_limit_per_operation: constants.hard_gas_limit_per_operation,
                    hard_storage_limit_per_operation: constants.hard_storage_limit_per_operation,
                    cost_per_byte: constants.cost_per_byte,
                    minimal_block_delay: constants.minimal_block_delay,
                })
            }
        }
    }

    /// Sign an arbitrary message with the configured key
    pub fn sign_message(&self, message: &[u8]) -> GatewayResult<String> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| GatewayError::Signing("no signing key configured".to_string()))?;
        Ok(signer.sign_message(message))
    }

    /// Verify a message signature against a public key
    pub fn verify_message(message: &[u8], signature: &str, public_key: &str) -> bool {
        Signer::verify_message(message, signature, public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationDetails, QueryRequest};

    const TZ1: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";

    #[tokio::test]
    async fn unknown_network_rejected_before_any_traffic() {
        let gateway = Gateway::new(Config::default()).unwrap();
        let request = QueryRequest::Balance {
            network: Network::Custom("nowherenet".to_string()),
            account: AccountRef::parse(TZ1).unwrap(),
        };
        let err = gateway.query(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownNetwork { .. }));
    }

    #[tokio::test]
    async fn execute_without_signer_fails_cleanly() {
        let gateway = Gateway::new(Config::default()).unwrap();
        let request = OperationRequest {
            network: Network::Shadownet,
            source: AccountRef::parse(TZ1).unwrap(),
            details: OperationDetails::Delegate { delegate: None },
        };
        let err = gateway.execute(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Signing(_)));
    }

    #[test]
    fn message_signing_through_facade() {
        let (signer, _) = Signer::generate().unwrap();
        let public_key = signer.public_key();
        let gateway = Gateway::new(Config::default()).unwrap().with_signer(signer);

        let signature = gateway.sign_message(b"gateway facade test").unwrap();
        assert!(Gateway::verify_message(
            b"gateway facade test",
            &signature,
            &public_key
        ));
        assert!(!Gateway::verify_message(
            b"different message",
            &signature,
            &public_key
        ));
    }

    #[test]
    fn sign_message_without_signer_fails() {
        let gateway = Gateway::new(Config::default()).unwrap();
        assert!(gateway.sign_message(b"x").is_err());
    }
}
