//! Shared data model for the gateway core
//!
//! Request and receipt types crossing the operation-request interface,
//! plus the small value types (network names, addresses, amounts) used
//! throughout the crate.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::forge::micheline::Micheline;
use crate::security;

/// Logical network identifier
///
/// Well-known networks get a variant; anything else configured at startup
/// is `Custom`. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Network {
    Mainnet,
    Shadownet,
    Ghostnet,
    Custom(String),
}

impl Network {
    /// Parse a caller-supplied network string (lowercased, trimmed)
    ///
    /// Whether the network is actually served is decided by the endpoint
    /// registry; this only rejects strings that could never be a network
    /// name.
    pub fn parse(name: &str) -> GatewayResult<Self> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(GatewayError::validation("network must be non-empty"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(GatewayError::validation(format!(
                "invalid network name: {name}"
            )));
        }
        Ok(match name.as_str() {
            "mainnet" => Network::Mainnet,
            "shadownet" => Network::Shadownet,
            "ghostnet" => Network::Ghostnet,
            _ => Network::Custom(name),
        })
    }

    /// The canonical lowercase name
    pub fn name(&self) -> &str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Shadownet => "shadownet",
            Network::Ghostnet => "ghostnet",
            Network::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Network {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Network::parse(&value)
    }
}

impl From<Network> for String {
    fn from(value: Network) -> Self {
        value.name().to_string()
    }
}

/// Address class of an [`AccountRef`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// tz1 / tz2 / tz3
    Implicit,
    /// KT1
    Contract,
}

/// A validated base58check account address
///
/// Pure value type; construction validates shape only, existence on chain
/// is a node concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountRef {
    address: String,
}

impl AccountRef {
    /// Parse and validate an address string
    pub fn parse(address: &str) -> GatewayResult<Self> {
        if !security::is_valid_address(address) {
            let preview: String = address.chars().take(20).collect();
            return Err(GatewayError::validation(format!(
                "invalid address format (expected tz1/tz2/tz3 or KT1): {preview}"
            )));
        }
        Ok(Self {
            address: address.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> AddressKind {
        if self.address.starts_with("KT1") {
            AddressKind::Contract
        } else {
            AddressKind::Implicit
        }
    }

    pub fn is_implicit(&self) -> bool {
        self.kind() == AddressKind::Implicit
    }
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

impl TryFrom<String> for AccountRef {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountRef::parse(&value)
    }
}

impl From<AccountRef> for String {
    fn from(value: AccountRef) -> Self {
        value.address
    }
}

/// An amount in the smallest unit (1 ꜩ = 1_000_000 mutez)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Hash,
)]
#[serde(transparent)]
pub struct Mutez(pub u64);

impl Mutez {
    pub fn new(mutez: u64) -> Self {
        Self(mutez)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, other: Mutez) -> Mutez {
        Mutez(self.0.saturating_add(other.0))
    }
}

impl std::fmt::Display for Mutez {
    /// Renders as decimal tez: `1_500_000` → `1.500000 ꜩ`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06} ꜩ", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

impl From<u64> for Mutez {
    fn from(mutez: u64) -> Self {
        Mutez(mutez)
    }
}

/// A write request entering the orchestrator
///
/// Created per external call; never persisted beyond the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Network to submit against
    pub network: Network,

    /// Implicit account paying fees and counters
    pub source: AccountRef,

    /// Kind-specific payload
    #[serde(flatten)]
    pub details: OperationDetails,
}

/// Kind-specific payload of an [`OperationRequest`]
///
/// One variant per operation kind rather than an untyped field bag, so a
/// transfer can never carry contract code and a delegation can never carry
/// an amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationDetails {
    /// Plain value transfer to an implicit or contract address
    Transfer {
        destination: AccountRef,
        amount: Mutez,
    },

    /// Invocation of a contract entry point
    Call {
        destination: AccountRef,
        /// Matched case-sensitively by the chain
        entry_point: String,
        /// Structured Micheline value; defaults to `Unit`
        #[serde(default)]
        parameters: Option<Micheline>,
        #[serde(default)]
        amount: Mutez,
    },

    /// Deployment of a new contract
    Originate {
        code: Micheline,
        storage: Micheline,
        #[serde(default)]
        balance: Mutez,
    },

    /// Delegation change; `None` clears the delegate
    Delegate {
        #[serde(default)]
        delegate: Option<AccountRef>,
    },
}

impl OperationDetails {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OperationDetails::Transfer { .. } => "transfer",
            OperationDetails::Call { .. } => "call",
            OperationDetails::Originate { .. } => "originate",
            OperationDetails::Delegate { .. } => "delegate",
        }
    }
}

/// A read request served by the chain or indexer clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryRequest {
    /// Spendable balance of an account
    Balance { network: Network, account: AccountRef },

    /// Current storage of a deployed contract
    ContractStorage {
        network: Network,
        contract: AccountRef,
    },

    /// Recent operations for an account, newest first
    Operations {
        network: Network,
        account: AccountRef,
        #[serde(default = "default_operations_limit")]
        limit: u32,
        #[serde(default)]
        cursor: Option<u64>,
    },

    /// A specific block, or head when `level` is absent
    BlockInfo {
        network: Network,
        #[serde(default)]
        level: Option<i64>,
    },

    /// Protocol constants of the network
    NetworkInfo { network: Network },
}

fn default_operations_limit() -> u32 {
    10
}

impl QueryRequest {
    pub fn network(&self) -> &Network {
        match self {
            QueryRequest::Balance { network, .. }
            | QueryRequest::ContractStorage { network, .. }
            | QueryRequest::Operations { network, .. }
            | QueryRequest::BlockInfo { network, .. }
            | QueryRequest::NetworkInfo { network } => network,
        }
    }
}

/// Where a submitted operation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Included,
    Failed,
}

/// Receipt produced at injection and refined by confirmation polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationReceipt {
    pub operation_hash: String,

    /// Block level the operation landed in, once observed
    pub included_in_block: Option<i64>,

    pub status: OperationStatus,

    /// Reason string when `status` is `Failed`
    pub error: Option<String>,
}

impl ConfirmationReceipt {
    /// Fresh receipt at injection time
    pub fn pending(operation_hash: impl Into<String>) -> Self {
        Self {
            operation_hash: operation_hash.into(),
            included_in_block: None,
            status: OperationStatus::Pending,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != OperationStatus::Pending
    }
}
