//! BIP39 mnemonic generation and seed derivation
//!
//! A 24-word phrase (256-bit entropy) derives the ed25519 seed: the BIP39
//! seed bytes are computed with an empty passphrase and the first 32 bytes
//! become the signing key seed.

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{GatewayError, GatewayResult};

/// Generate a new 24-word BIP39 mnemonic from 256-bit entropy
pub fn generate_mnemonic() -> GatewayResult<String> {
    let mut entropy = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(entropy.as_mut());
    let mnemonic = Mnemonic::from_entropy(entropy.as_ref())
        .map_err(|e| GatewayError::Signing(format!("mnemonic generation failed: {e}")))?;
    Ok(mnemonic.to_string())
}

/// Derive the 32-byte ed25519 seed from a mnemonic phrase
pub fn seed_from_mnemonic(phrase: &str) -> GatewayResult<Zeroizing<[u8; 32]>> {
    let mnemonic = Mnemonic::parse_normalized(phrase)
        .map_err(|e| GatewayError::Signing(format!("invalid mnemonic: {e}")))?;

    let seed = Zeroizing::new(mnemonic.to_seed_normalized(""));
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&seed[..32]);
    Ok(out)
}

/// Validate that a phrase is a well-formed BIP39 mnemonic
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_normalized(phrase).is_ok()
}
