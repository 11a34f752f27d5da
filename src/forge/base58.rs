//! Tezos base58check encoding
//!
//! Every chain identifier (addresses, keys, signatures, block and operation
//! hashes) is base58 over `prefix ‖ payload ‖ sha256d(prefix ‖ payload)[..4]`.
//! The prefix bytes select the human-readable lead characters.

use sha2::{Digest, Sha256};

use super::ForgeError;

/// Known prefixes: (lead string, prefix bytes, payload length)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    /// tz1: ed25519 public key hash (20 bytes)
    Tz1,
    /// tz2: secp256k1 public key hash (20 bytes)
    Tz2,
    /// tz3: p256 public key hash (20 bytes)
    Tz3,
    /// KT1: originated contract hash (20 bytes)
    Kt1,
    /// B: block hash (32 bytes)
    Block,
    /// o: operation hash (32 bytes)
    Operation,
    /// edpk: ed25519 public key (32 bytes)
    Edpk,
    /// edsk: ed25519 seed (32 bytes)
    Edsk,
    /// edsig: ed25519 signature (64 bytes)
    Edsig,
}

impl Prefix {
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Prefix::Tz1 => &[6, 161, 159],
            Prefix::Tz2 => &[6, 161, 161],
            Prefix::Tz3 => &[6, 161, 164],
            Prefix::Kt1 => &[2, 90, 121],
            Prefix::Block => &[1, 52],
            Prefix::Operation => &[5, 116],
            Prefix::Edpk => &[13, 15, 37, 217],
            Prefix::Edsk => &[13, 15, 58, 7],
            Prefix::Edsig => &[9, 245, 205, 134, 18],
        }
    }

    pub const fn payload_len(self) -> usize {
        match self {
            Prefix::Tz1 | Prefix::Tz2 | Prefix::Tz3 | Prefix::Kt1 => 20,
            Prefix::Block | Prefix::Operation | Prefix::Edpk | Prefix::Edsk => 32,
            Prefix::Edsig => 64,
        }
    }

    pub const fn lead(self) -> &'static str {
        match self {
            Prefix::Tz1 => "tz1",
            Prefix::Tz2 => "tz2",
            Prefix::Tz3 => "tz3",
            Prefix::Kt1 => "KT1",
            Prefix::Block => "B",
            Prefix::Operation => "o",
            Prefix::Edpk => "edpk",
            Prefix::Edsk => "edsk",
            Prefix::Edsig => "edsig",
        }
    }
}

fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Encode a payload under the given prefix
pub fn encode(prefix: Prefix, payload: &[u8]) -> String {
    let mut raw = Vec::with_capacity(prefix.bytes().len() + payload.len() + 4);
    raw.extend_from_slice(prefix.bytes());
    raw.extend_from_slice(payload);
    let checksum = sha256d(&raw);
    raw.extend_from_slice(&checksum[..4]);
    bs58::encode(raw).into_string()
}

/// Decode a base58check string, validating prefix, length and checksum
pub fn decode(prefix: Prefix, encoded: &str) -> Result<Vec<u8>, ForgeError> {
    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| ForgeError::Base58(format!("invalid base58: {e}")))?;

    let prefix_bytes = prefix.bytes();
    let expected_len = prefix_bytes.len() + prefix.payload_len() + 4;
    if raw.len() != expected_len {
        return Err(ForgeError::Base58(format!(
            "wrong length for {}: got {} bytes, expected {}",
            prefix.lead(),
            raw.len(),
            expected_len
        )));
    }
    if &raw[..prefix_bytes.len()] != prefix_bytes {
        return Err(ForgeError::Base58(format!(
            "wrong prefix, expected {}",
            prefix.lead()
        )));
    }

    let (body, checksum) = raw.split_at(raw.len() - 4);
    if sha256d(body)[..4] != *checksum {
        return Err(ForgeError::Base58("checksum mismatch".to_string()));
    }

    Ok(body[prefix_bytes.len()..].to_vec())
}

/// Decode any implicit address (tz1/tz2/tz3) into (curve tag, 20-byte hash)
pub fn decode_implicit(address: &str) -> Result<(u8, Vec<u8>), ForgeError> {
    for (tag, prefix) in [(0u8, Prefix::Tz1), (1, Prefix::Tz2), (2, Prefix::Tz3)] {
        if address.starts_with(prefix.lead()) {
            return Ok((tag, decode(prefix, address)?));
        }
    }
    Err(ForgeError::Base58(format!(
        "not an implicit address: {address}"
    )))
}
