//! HTTP implementation of the chain client
//!
//! One client per resolved endpoint. Every request reports its transport
//! outcome to the endpoint registry that produced the endpoint, so health
//! state converges from real traffic without a separate probe loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::registry::{Endpoint, EndpointRegistry};
use crate::security;
use crate::types::{AccountRef, Mutez};

use super::types::{parse_run_operation, BlockHeader, ProtocolConstants, SimulationResult};
use super::ChainRpc;

/// Placeholder signature for simulation requests; the node checks shape,
/// not validity, during a dry run.
fn placeholder_signature() -> String {
    crate::forge::base58::encode(crate::forge::base58::Prefix::Edsig, &[0u8; 64])
}

/// Chain client bound to one RPC endpoint
pub struct HttpChainClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    registry: Arc<EndpointRegistry>,
    timeout: Duration,
}

impl HttpChainClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: Endpoint,
        registry: Arc<EndpointRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            endpoint,
            registry,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.url.trim_end_matches('/'), path)
    }

    /// Send a request, classify the outcome, and report endpoint health
    async fn execute(&self, request: reqwest::RequestBuilder) -> GatewayResult<reqwest::Response> {
        crate::metrics::metrics().rpc_requests_total.inc();

        match request.timeout(self.timeout).send().await {
            Ok(response) => {
                // Gateway-class statuses point at the endpoint, not the request
                let endpoint_failed = matches!(response.status().as_u16(), 502 | 503 | 504);
                self.registry.report(&self.endpoint, !endpoint_failed);
                if endpoint_failed {
                    crate::metrics::metrics().rpc_failures_total.inc();
                }
                Ok(response)
            }
            Err(err) => {
                self.registry.report(&self.endpoint, false);
                crate::metrics::metrics().rpc_failures_total.inc();
                let classified = GatewayError::from_transport(
                    &err,
                    &self.endpoint.url,
                    self.timeout.as_millis() as u64,
                );
                warn!(
                    url = %self.endpoint.url,
                    error = %security::sanitize_log_message(&err.to_string()),
                    "Chain RPC transport failure"
                );
                Err(classified)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let response = self.execute(self.http.get(self.url(path))).await?;
        self.decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> GatewayResult<T> {
        let response = self
            .execute(self.http.post(self.url(path)).json(body))
            .await?;
        self.decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> GatewayResult<T> {
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
}

#[async_trait]
impl ChainRpc for HttpChainClient {
    fn endpoint_url(&self) -> &str {
        &self.endpoint.url
    }

    async fn head(&self) -> GatewayResult<BlockHeader> {
        self.get_json("chains/main/blocks/head/header").await
    }

    async fn chain_id(&self) -> GatewayResult<String> {
        self.get_json("chains/main/chain_id").await
    }

    async fn counter(&self, account: &AccountRef) -> GatewayResult<u64> {
        let raw: String = self
            .get_json(&format!(
                "chains/main/blocks/head/context/contracts/{account}/counter"
            ))
            .await?;
        raw.parse::<u64>().map_err(|e| GatewayError::RpcResponse {
            endpoint: self.endpoint.url.clone(),
            message: format!("malformed counter '{raw}': {e}"),
            status: None,
        })
    }

    async fn balance(&self, account: &AccountRef) -> GatewayResult<Mutez> {
        let raw: String = self
            .get_json(&format!(
                "chains/main/blocks/head/context/contracts/{account}/balance"
            ))
            .await?;
        raw.parse::<u64>()
            .map(Mutez)
            .map_err(|e| GatewayError::RpcResponse {
                endpoint: self.endpoint.url.clone(),
                message: format!("malformed balance '{raw}': {e}"),
                status: None,
            })
    }

    async fn manager_key(&self, account: &AccountRef) -> GatewayResult<Option<String>> {
        self.get_json(&format!(
            "chains/main/blocks/head/context/contracts/{account}/manager_key"
        ))
        .await
    }

    async fn constants(&self) -> GatewayResult<ProtocolConstants> {
        self.get_json("chains/main/blocks/head/context/constants")
            .await
    }

    async fn simulate(
        &self,
        branch: &str,
        contents: &[Value],
        chain_id: &str,
    ) -> GatewayResult<SimulationResult> {
        let body = serde_json::json!({
            "operation": {
                "branch": branch,
                "contents": contents,
                "signature": placeholder_signature(),
            },
            "chain_id": chain_id,
        });

        let response = self
            .execute(
                self.http
                    .post(self.url("chains/main/blocks/head/helpers/scripts/run_operation"))
                    .json(&body),
            )
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            // The node reports script failures as an error-status JSON
            // array; that is a simulation verdict, not a transport problem.
            if text.trim_start().starts_with('[') && text.contains("\"id\"") {
                debug!(status = status.as_u16(), "run_operation reported script errors");
                return Ok(SimulationResult {
                    applied: false,
                    contents: Vec::new(),
                    error: Some(security::sanitize_error_message(&text)),
                });
            }
            return Err(GatewayError::RpcResponse {
                endpoint: self.endpoint.url.clone(),
                message: security::sanitize_error_message(&text),
                status: Some(status.as_u16()),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| GatewayError::RpcResponse {
            endpoint: self.endpoint.url.clone(),
            message: format!("malformed run_operation response: {e}"),
            status: None,
        })?;
        parse_run_operation(&body)
    }

    async fn inject(&self, signed_hex: &str) -> GatewayResult<String> {
        let response = self
            .execute(
                self.http
                    .post(self.url("injection/operation?chain=main"))
                    .json(&Value::String(signed_hex.to_string())),
            )
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(GatewayError::InjectionRejected {
                endpoint: self.endpoint.url.clone(),
                reason: security::sanitize_error_message(&text),
            });
        }

        serde_json::from_str::<String>(&text).map_err(|e| GatewayError::RpcResponse {
            endpoint: self.endpoint.url.clone(),
            message: format!("malformed injection response '{text}': {e}"),
            status: None,
        })
    }

    async fn operation_hashes(&self, level: i64) -> GatewayResult<Vec<String>> {
        let nested: Vec<Vec<String>> = self
            .get_json(&format!("chains/main/blocks/{level}/operation_hashes"))
            .await?;
        Ok(nested.into_iter().flatten().collect())
    }
}
