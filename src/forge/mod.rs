//! Local operation forging
//!
//! Encoding an operation group's logical fields into the canonical byte
//! string that gets signed and hashed. Everything here is pure: no I/O,
//! no chain state, just codecs.
//!
//! Layout of a forged group: 32-byte branch hash followed by the
//! concatenated binary contents. Each content starts with its kind tag,
//! then the 21-byte source, then fee / counter / gas_limit / storage_limit
//! as zarith naturals, then the kind-specific payload.

pub mod base58;
pub mod micheline;
pub mod zarith;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde_json::Value;
use thiserror::Error;

use crate::error::GatewayError;
use crate::types::{AccountRef, AddressKind, Mutez};

use base58::Prefix;
use micheline::Micheline;

/// Content kind tags of the binary encoding
const TAG_REVEAL: u8 = 107;
const TAG_TRANSACTION: u8 = 108;
const TAG_ORIGINATION: u8 = 109;
const TAG_DELEGATION: u8 = 110;

/// Errors from the pure encoding layer
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    #[error("base58 error: {0}")]
    Base58(String),

    #[error("zarith error: {0}")]
    Zarith(String),

    #[error("micheline error: {0}")]
    Micheline(String),

    #[error("unknown michelson primitive: {0}")]
    UnknownPrimitive(String),

    #[error("entrypoint name exceeds 31 bytes: {0}")]
    EntrypointTooLong(String),

    #[error("unsupported key encoding: {0}")]
    UnsupportedKey(String),
}

impl From<ForgeError> for GatewayError {
    fn from(err: ForgeError) -> Self {
        GatewayError::Forge(err.to_string())
    }
}

/// Blake2b digest with a caller-chosen output size
pub fn blake2b(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(out_len).expect("blake2b output size within 1..=64");
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer sized to digest");
    out
}

/// 32-byte Blake2b, the operation/signing digest size
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&blake2b(data, 32));
    out
}

/// 20-byte Blake2b, the public-key-hash size
pub fn blake2b_160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&blake2b(data, 20));
    out
}

/// Compute the base58check operation hash of signed operation bytes
pub fn operation_hash(signed_bytes: &[u8]) -> String {
    base58::encode(Prefix::Operation, &blake2b_256(signed_bytes))
}

/// Protocol-required envelope fields shared by every content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub fee: Mutez,
    pub counter: u64,
    pub gas_limit: u64,
    pub storage_limit: u64,
}

impl Limits {
    /// Placeholder limits for the first simulation pass
    pub fn placeholder(counter: u64, hard_gas_limit: u64, hard_storage_limit: u64) -> Self {
        Self {
            fee: Mutez(0),
            counter,
            gas_limit: hard_gas_limit,
            storage_limit: hard_storage_limit,
        }
    }
}

/// One entry of an operation group
#[derive(Debug, Clone)]
pub enum OperationContent {
    /// Publication of the source's public key, prepended once per account
    Reveal {
        source: AccountRef,
        public_key: String,
        limits: Limits,
    },

    /// Value transfer, optionally invoking a contract entry point
    Transaction {
        source: AccountRef,
        destination: AccountRef,
        amount: Mutez,
        entry_point: Option<String>,
        parameters: Option<Micheline>,
        limits: Limits,
    },

    /// Contract deployment
    Origination {
        source: AccountRef,
        balance: Mutez,
        code: Micheline,
        storage: Micheline,
        limits: Limits,
    },

    /// Delegate change (`None` withdraws the delegation)
    Delegation {
        source: AccountRef,
        delegate: Option<AccountRef>,
        limits: Limits,
    },
}

impl OperationContent {
    pub fn limits(&self) -> &Limits {
        match self {
            OperationContent::Reveal { limits, .. }
            | OperationContent::Transaction { limits, .. }
            | OperationContent::Origination { limits, .. }
            | OperationContent::Delegation { limits, .. } => limits,
        }
    }

    pub fn limits_mut(&mut self) -> &mut Limits {
        match self {
            OperationContent::Reveal { limits, .. }
            | OperationContent::Transaction { limits, .. }
            | OperationContent::Origination { limits, .. }
            | OperationContent::Delegation { limits, .. } => limits,
        }
    }

    pub fn counter(&self) -> u64 {
        self.limits().counter
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            OperationContent::Reveal { .. } => "reveal",
            OperationContent::Transaction { .. } => "transaction",
            OperationContent::Origination { .. } => "origination",
            OperationContent::Delegation { .. } => "delegation",
        }
    }

    /// JSON form for the node's `run_operation` endpoint
    ///
    /// Envelope numbers travel as decimal strings per the RPC schema.
    pub fn to_rpc_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        let limits = self.limits();
        obj.insert("kind".into(), Value::String(self.kind_name().into()));
        obj.insert("source".into(), Value::String(self.source().to_string()));
        obj.insert("fee".into(), Value::String(limits.fee.get().to_string()));
        obj.insert("counter".into(), Value::String(limits.counter.to_string()));
        obj.insert(
            "gas_limit".into(),
            Value::String(limits.gas_limit.to_string()),
        );
        obj.insert(
            "storage_limit".into(),
            Value::String(limits.storage_limit.to_string()),
        );

        match self {
            OperationContent::Reveal { public_key, .. } => {
                obj.insert("public_key".into(), Value::String(public_key.clone()));
            }
            OperationContent::Transaction {
                destination,
                amount,
                entry_point,
                parameters,
                ..
            } => {
                obj.insert("amount".into(), Value::String(amount.get().to_string()));
                obj.insert("destination".into(), Value::String(destination.to_string()));
                if entry_point.is_some() || parameters.is_some() {
                    let value = parameters
                        .clone()
                        .unwrap_or_else(Micheline::unit)
                        .to_json();
                    obj.insert(
                        "parameters".into(),
                        serde_json::json!({
                            "entrypoint": entry_point.as_deref().unwrap_or("default"),
                            "value": value,
                        }),
                    );
                }
            }
            OperationContent::Origination {
                balance,
                code,
                storage,
                ..
            } => {
                obj.insert("balance".into(), Value::String(balance.get().to_string()));
                obj.insert(
                    "script".into(),
                    serde_json::json!({
                        "code": code.to_json(),
                        "storage": storage.to_json(),
                    }),
                );
            }
            OperationContent::Delegation { delegate, .. } => {
                if let Some(delegate) = delegate {
                    obj.insert("delegate".into(), Value::String(delegate.to_string()));
                }
            }
        }

        Value::Object(obj)
    }

    pub fn source(&self) -> &AccountRef {
        match self {
            OperationContent::Reveal { source, .. }
            | OperationContent::Transaction { source, .. }
            | OperationContent::Origination { source, .. }
            | OperationContent::Delegation { source, .. } => source,
        }
    }

    /// Append the binary encoding of this content
    pub fn forge_into(&self, out: &mut Vec<u8>) -> Result<(), ForgeError> {
        match self {
            OperationContent::Reveal { public_key, .. } => {
                out.push(TAG_REVEAL);
                self.put_envelope(out)?;
                put_public_key(public_key, out)?;
            }
            OperationContent::Transaction {
                destination,
                amount,
                entry_point,
                parameters,
                ..
            } => {
                out.push(TAG_TRANSACTION);
                self.put_envelope(out)?;
                zarith::put_nat(amount.get(), out);
                put_contract_id(destination, out)?;
                match parameters {
                    None if entry_point.is_none() => out.push(0x00),
                    _ => {
                        out.push(0xff);
                        put_entrypoint(entry_point.as_deref().unwrap_or("default"), out)?;
                        let value = parameters.clone().unwrap_or_else(Micheline::unit);
                        let forged = value.forge()?;
                        out.extend_from_slice(&(forged.len() as u32).to_be_bytes());
                        out.extend_from_slice(&forged);
                    }
                }
            }
            OperationContent::Origination {
                balance,
                code,
                storage,
                ..
            } => {
                out.push(TAG_ORIGINATION);
                self.put_envelope(out)?;
                zarith::put_nat(balance.get(), out);
                // No delegate at origination; set_delegate covers it later
                out.push(0x00);
                let code_bytes = code.forge()?;
                out.extend_from_slice(&(code_bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(&code_bytes);
                let storage_bytes = storage.forge()?;
                out.extend_from_slice(&(storage_bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(&storage_bytes);
            }
            OperationContent::Delegation { delegate, .. } => {
                out.push(TAG_DELEGATION);
                self.put_envelope(out)?;
                match delegate {
                    Some(delegate) => {
                        out.push(0xff);
                        put_implicit(delegate, out)?;
                    }
                    None => out.push(0x00),
                }
            }
        }
        Ok(())
    }

    /// Source + fee + counter + gas_limit + storage_limit
    fn put_envelope(&self, out: &mut Vec<u8>) -> Result<(), ForgeError> {
        let limits = self.limits();
        put_implicit(self.source(), out)?;
        zarith::put_nat(limits.fee.get(), out);
        zarith::put_nat(limits.counter, out);
        zarith::put_nat(limits.gas_limit, out);
        zarith::put_nat(limits.storage_limit, out);
        Ok(())
    }
}

/// 21-byte implicit account: curve tag + 20-byte hash
fn put_implicit(account: &AccountRef, out: &mut Vec<u8>) -> Result<(), ForgeError> {
    let (tag, hash) = base58::decode_implicit(account.as_str())?;
    out.push(tag);
    out.extend_from_slice(&hash);
    Ok(())
}

/// 22-byte contract id: implicit (0x00 + pkh) or originated (0x01 + hash + pad)
fn put_contract_id(account: &AccountRef, out: &mut Vec<u8>) -> Result<(), ForgeError> {
    match account.kind() {
        AddressKind::Implicit => {
            out.push(0x00);
            put_implicit(account, out)?;
        }
        AddressKind::Contract => {
            out.push(0x01);
            let hash = base58::decode(Prefix::Kt1, account.as_str())?;
            out.extend_from_slice(&hash);
            out.push(0x00);
        }
    }
    Ok(())
}

/// Entry point: reserved single-byte tags, or 0xff + length + name
fn put_entrypoint(name: &str, out: &mut Vec<u8>) -> Result<(), ForgeError> {
    match name {
        "default" => out.push(0x00),
        "root" => out.push(0x01),
        "do" => out.push(0x02),
        "set_delegate" => out.push(0x03),
        "remove_delegate" => out.push(0x04),
        other => {
            if other.len() > 31 {
                return Err(ForgeError::EntrypointTooLong(other.to_string()));
            }
            out.push(0xff);
            out.push(other.len() as u8);
            out.extend_from_slice(other.as_bytes());
        }
    }
    Ok(())
}

/// Public key: curve tag + raw key bytes (ed25519 only)
fn put_public_key(encoded: &str, out: &mut Vec<u8>) -> Result<(), ForgeError> {
    if !encoded.starts_with("edpk") {
        let preview: String = encoded.chars().take(8).collect();
        return Err(ForgeError::UnsupportedKey(format!(
            "expected edpk key, got: {preview}"
        )));
    }
    let raw = base58::decode(Prefix::Edpk, encoded)?;
    out.push(0x00);
    out.extend_from_slice(&raw);
    Ok(())
}

/// An unsigned, forged operation group
#[derive(Debug, Clone)]
pub struct ForgedOperation {
    /// Branch block hash the group is anchored to
    pub branch: String,

    /// Ordered contents; counters strictly increase per source
    pub contents: Vec<OperationContent>,

    /// Canonical bytes: branch hash + concatenated contents
    pub forged_bytes: Vec<u8>,
}

impl ForgedOperation {
    /// Forge a group from its branch and contents
    pub fn forge(branch: &str, contents: Vec<OperationContent>) -> Result<Self, ForgeError> {
        let mut bytes = base58::decode(Prefix::Block, branch)?;
        for content in &contents {
            content.forge_into(&mut bytes)?;
        }
        Ok(Self {
            branch: branch.to_string(),
            contents,
            forged_bytes: bytes,
        })
    }

    /// Contents in the JSON form expected by `run_operation`
    pub fn rpc_contents(&self) -> Vec<Value> {
        self.contents.iter().map(OperationContent::to_rpc_json).collect()
    }
}

/// A forged group plus its signature and hash
///
/// Immutable once produced; injecting the same instance twice yields the
/// same operation hash, and retries never re-forge.
#[derive(Debug, Clone)]
pub struct SignedOperation {
    pub forged: ForgedOperation,
    pub signature: Vec<u8>,
    pub operation_hash: String,
}

impl SignedOperation {
    /// Attach a 64-byte signature and derive the operation hash
    pub fn new(forged: ForgedOperation, signature: Vec<u8>) -> Self {
        let mut signed_bytes = forged.forged_bytes.clone();
        signed_bytes.extend_from_slice(&signature);
        let operation_hash = operation_hash(&signed_bytes);
        Self {
            forged,
            signature,
            operation_hash,
        }
    }

    /// Raw signed bytes: forged group followed by the signature
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = self.forged.forged_bytes.clone();
        bytes.extend_from_slice(&self.signature);
        bytes
    }

    /// Hex payload for the injection endpoint
    pub fn injection_hex(&self) -> String {
        hex::encode(self.signed_bytes())
    }
}
