//! Indexer client: the rich read path
//!
//! Historical queries (operation history, contract storage, block lookups)
//! go to a TzKT-style indexer rather than the consensus node. The indexer
//! ingests chain data asynchronously, so a submitted operation may be
//! absent here for a bounded grace period even after chain inclusion.
//! Absence within that window is not failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};
use crate::registry::{Endpoint, EndpointRegistry};
use crate::security;
use crate::types::AccountRef;

/// One row of indexed operation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedOperation {
    /// Indexer-assigned row id; doubles as the pagination cursor
    pub id: u64,

    #[serde(rename = "type")]
    pub operation_type: String,

    pub hash: String,

    #[serde(default)]
    pub sender: Option<IndexedAddress>,

    #[serde(default)]
    pub target: Option<IndexedAddress>,

    #[serde(default)]
    pub amount: Option<u64>,

    #[serde(default)]
    pub status: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub level: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedAddress {
    pub address: String,
}

/// Indexed view of a block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedBlock {
    pub level: i64,

    #[serde(default)]
    pub hash: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub proposer: Option<IndexedAddress>,
}

/// One page of a cursor-based operation history scan
///
/// The sequence is lazy, finite and restartable: each page carries the
/// cursor of its last row, and repeating a request with the same cursor
/// returns the same page.
#[derive(Debug, Clone)]
pub struct OperationPage {
    pub items: Vec<IndexedOperation>,
    pub next_cursor: Option<u64>,
}

impl OperationPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Read-only client bound to one indexer endpoint
pub struct IndexerClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    registry: Arc<EndpointRegistry>,
    timeout: Duration,
    lag_grace: Duration,
}

impl IndexerClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: Endpoint,
        registry: Arc<EndpointRegistry>,
        timeout: Duration,
        lag_grace: Duration,
    ) -> Self {
        Self {
            http,
            endpoint,
            registry,
            timeout,
            lag_grace,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        crate::metrics::metrics().rpc_requests_total.inc();

        let response = match self
            .http
            .get(self.url(path))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => {
                self.registry.report(&self.endpoint, true);
                response
            }
            Err(err) => {
                self.registry.report(&self.endpoint, false);
                crate::metrics::metrics().rpc_failures_total.inc();
                warn!(
                    url = %self.endpoint.url,
                    error = %security::sanitize_log_message(&err.to_string()),
                    "Indexer transport failure"
                );
                return Err(GatewayError::from_transport(
                    &err,
                    &self.endpoint.url,
                    self.timeout.as_millis() as u64,
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::RpcResponse {
                endpoint: self.endpoint.url.clone(),
                message: security::sanitize_error_message(&format!("{path}: {body}")),
                status: Some(status.as_u16()),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::RpcResponse {
                endpoint: self.endpoint.url.clone(),
                message: format!("{path}: malformed response: {e}"),
                status: None,
            })
    }

    /// Transaction history of an account, newest rows after `cursor`
    ///
    /// Cursor-based: pass the previous page's `next_cursor` to continue.
    /// Repeated calls with the same cursor are idempotent.
    pub async fn operations(
        &self,
        account: &AccountRef,
        limit: u32,
        cursor: Option<u64>,
    ) -> GatewayResult<OperationPage> {
        let limit = security::validate_limit(limit)?;

        let mut path = format!(
            "v1/accounts/{account}/operations?type=transaction&limit={limit}"
        );
        if let Some(cursor) = cursor {
            path.push_str(&format!("&lastId={cursor}"));
        }

        let items: Vec<IndexedOperation> = self.get_json(&path).await?;
        let next_cursor = if (items.len() as u32) < limit {
            None
        } else {
            items.last().map(|row| row.id)
        };

        Ok(OperationPage { items, next_cursor })
    }

    /// All indexed rows for an operation hash; empty while the indexer lags
    pub async fn operations_by_hash(
        &self,
        operation_hash: &str,
    ) -> GatewayResult<Vec<IndexedOperation>> {
        if !security::is_operation_hash(operation_hash) {
            return Err(GatewayError::validation(format!(
                "invalid operation hash: {operation_hash}"
            )));
        }
        self.get_json(&format!("v1/operations/{operation_hash}"))
            .await
    }

    /// Current storage of a deployed contract as structured JSON
    pub async fn contract_storage(&self, contract: &AccountRef) -> GatewayResult<Value> {
        if contract.is_implicit() {
            return Err(GatewayError::validation(format!(
                "not a contract address: {contract}"
            )));
        }
        self.get_json(&format!("v1/contracts/{contract}/storage"))
            .await
    }

    /// A block by level, or the indexer's head when `level` is absent
    pub async fn block_info(&self, level: Option<i64>) -> GatewayResult<IndexedBlock> {
        match level {
            Some(level) => self.get_json(&format!("v1/blocks/{level}")).await,
            None => self.get_json("v1/head").await,
        }
    }

    /// Whether an operation included at `included_at` may still
    /// legitimately be missing from this indexer
    pub fn absence_within_grace(&self, included_at: DateTime<Utc>) -> bool {
        let elapsed = Utc::now().signed_duration_since(included_at);
        elapsed
            .to_std()
            .map(|elapsed| elapsed < self.lag_grace)
            .unwrap_or(true)
    }
}
