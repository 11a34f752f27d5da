//! Typed views of node RPC responses
//!
//! Only the fields the gateway consumes are modeled; everything else in
//! the node's JSON is ignored on deserialization. Numeric fields travel
//! as decimal strings per the RPC schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

fn string_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse::<u64>().map_err(serde::de::Error::custom)
}

/// Shell header of a block
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    pub protocol: String,
    pub chain_id: String,
    pub hash: String,
    pub level: i64,
    pub timestamp: DateTime<Utc>,
}

/// Protocol constants relevant to operation building
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConstants {
    #[serde(deserialize_with = "string_u64")]
    pub hard_gas_limit_per_operation: u64,

    #[serde(deserialize_with = "string_u64")]
    pub hard_storage_limit_per_operation: u64,

    #[serde(deserialize_with = "string_u64")]
    pub cost_per_byte: u64,

    #[serde(default, deserialize_with = "opt_string_u64")]
    pub minimal_block_delay: Option<u64>,
}

fn opt_string_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| s.parse::<u64>().map_err(serde::de::Error::custom))
        .transpose()
}

/// Per-content outcome of a dry run
#[derive(Debug, Clone, Default)]
pub struct ContentSimulation {
    pub consumed_milligas: u64,
    pub paid_storage_size_diff: u64,
    pub allocated_destination_contract: bool,
}

impl ContentSimulation {
    /// Whole gas units consumed, rounded up
    pub fn gas_units(&self) -> u64 {
        self.consumed_milligas.div_ceil(1000)
    }
}

/// Outcome of simulating an operation group
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// True only when every content applied
    pub applied: bool,

    /// One entry per simulated content, in order
    pub contents: Vec<ContentSimulation>,

    /// The node's error payload, verbatim, when not applied
    pub error: Option<String>,
}

impl SimulationResult {
    pub fn total_gas_units(&self) -> u64 {
        self.contents.iter().map(ContentSimulation::gas_units).sum()
    }
}

/// Parse a `run_operation` response body
///
/// The interesting part lives at
/// `contents[].metadata.operation_result`: a status string plus consumed
/// gas and storage accounting. Internal operation results contribute
/// their gas on top of the host content's.
pub fn parse_run_operation(body: &Value) -> GatewayResult<SimulationResult> {
    let contents = body
        .get("contents")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GatewayError::internal(format!("run_operation response without contents: {body}"))
        })?;

    let mut applied = true;
    let mut parsed = Vec::with_capacity(contents.len());
    let mut error = None;

    for content in contents {
        let metadata = content.get("metadata").cloned().unwrap_or(Value::Null);
        let result = metadata
            .get("operation_result")
            .cloned()
            .unwrap_or(Value::Null);

        let status = result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("missing");
        if status != "applied" {
            applied = false;
            if error.is_none() {
                let errors = result.get("errors").cloned().unwrap_or(Value::Null);
                error = Some(match errors {
                    Value::Null => format!("operation_result status: {status}"),
                    other => other.to_string(),
                });
            }
        }

        let mut simulation = ContentSimulation {
            consumed_milligas: value_u64(result.get("consumed_milligas")),
            paid_storage_size_diff: value_u64(result.get("paid_storage_size_diff")),
            allocated_destination_contract: result
                .get("allocated_destination_contract")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        if let Some(internals) = metadata
            .get("internal_operation_results")
            .and_then(Value::as_array)
        {
            for internal in internals {
                let internal_result = internal.get("result").cloned().unwrap_or(Value::Null);
                let internal_status = internal_result
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("applied");
                if internal_status != "applied" {
                    applied = false;
                    if error.is_none() {
                        error = Some(
                            internal_result
                                .get("errors")
                                .cloned()
                                .unwrap_or(Value::Null)
                                .to_string(),
                        );
                    }
                }
                simulation.consumed_milligas +=
                    value_u64(internal_result.get("consumed_milligas"));
                simulation.paid_storage_size_diff +=
                    value_u64(internal_result.get("paid_storage_size_diff"));
            }
        }

        parsed.push(simulation);
    }

    Ok(SimulationResult {
        applied,
        contents: parsed,
        error,
    })
}

fn value_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}
