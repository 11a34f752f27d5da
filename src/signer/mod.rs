//! Ed25519 signing over forged operations and plain messages
//!
//! Key material lives only in process memory for the lifetime of the
//! signer and is zeroized on drop. Nothing here logs or serializes a
//! secret; the only path that returns one is the explicit
//! [`derive_address`] result.
//!
//! Signing is a pure function of (key, bytes): no shared mutable state,
//! safe to call concurrently for independent operations.

pub mod mnemonic;

use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

use crate::error::{GatewayError, GatewayResult};
use crate::forge::base58::{self, Prefix};
use crate::forge::{blake2b_160, blake2b_256, ForgedOperation, SignedOperation};
use crate::types::AccountRef;

/// Watermark prepended to forged bytes before the signing digest
const WATERMARK_GENERIC_OPERATION: u8 = 0x03;

/// Holds one ed25519 key and produces signatures
pub struct Signer {
    signing: SigningKey,
}

impl Signer {
    /// Construct from a base58check `edsk` seed
    pub fn from_secret_key(encoded: &str) -> GatewayResult<Self> {
        if !encoded.starts_with("edsk") {
            return Err(GatewayError::Signing(
                "expected an edsk-encoded ed25519 secret key".to_string(),
            ));
        }
        let raw = base58::decode(Prefix::Edsk, encoded)
            .map_err(|e| GatewayError::Signing(format!("malformed secret key: {e}")))?;
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&raw);
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Construct by deriving from a BIP39 mnemonic phrase
    pub fn from_mnemonic(phrase: &str) -> GatewayResult<Self> {
        let seed = mnemonic::seed_from_mnemonic(phrase)?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Generate a fresh key, returning the signer and its mnemonic
    pub fn generate() -> GatewayResult<(Self, String)> {
        let phrase = mnemonic::generate_mnemonic()?;
        let signer = Self::from_mnemonic(&phrase)?;
        Ok((signer, phrase))
    }

    /// Base58check `edpk` public key
    pub fn public_key(&self) -> String {
        base58::encode(Prefix::Edpk, self.signing.verifying_key().as_bytes())
    }

    /// tz1 address derived from the public key hash
    pub fn address(&self) -> GatewayResult<AccountRef> {
        let hash = blake2b_160(self.signing.verifying_key().as_bytes());
        let encoded = base58::encode(Prefix::Tz1, &hash);
        AccountRef::parse(&encoded)
    }

    /// Sign a forged operation group
    ///
    /// The signature covers blake2b-256 of the watermarked forged bytes;
    /// the returned value carries the derived operation hash.
    pub fn sign_forged(&self, forged: ForgedOperation) -> SignedOperation {
        let mut watermarked = Vec::with_capacity(forged.forged_bytes.len() + 1);
        watermarked.push(WATERMARK_GENERIC_OPERATION);
        watermarked.extend_from_slice(&forged.forged_bytes);
        let digest = blake2b_256(&watermarked);
        let signature = self.signing.sign(&digest);
        SignedOperation::new(forged, signature.to_bytes().to_vec())
    }

    /// Sign an arbitrary message, returning a base58check `edsig`
    pub fn sign_message(&self, message: &[u8]) -> String {
        let digest = blake2b_256(message);
        let signature = self.signing.sign(&digest);
        base58::encode(Prefix::Edsig, &signature.to_bytes())
    }

    /// Verify a message signature against an `edpk` public key
    ///
    /// Returns `false` for malformed keys or signatures rather than
    /// erroring: a bad signature and an unverifiable one are the same
    /// answer to the caller.
    pub fn verify_message(message: &[u8], signature: &str, public_key: &str) -> bool {
        let Ok(sig_raw) = base58::decode(Prefix::Edsig, signature) else {
            return false;
        };
        let Ok(key_raw) = base58::decode(Prefix::Edpk, public_key) else {
            return false;
        };
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&key_raw);
        let Ok(verifying) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(&sig_raw);
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

        let digest = blake2b_256(message);
        verifying.verify(&digest, &sig).is_ok()
    }

    /// Base58check `edsk` secret key
    ///
    /// Only [`derive_address`] should surface this to a caller.
    fn secret_key(&self) -> String {
        base58::encode(Prefix::Edsk, self.signing.to_bytes().as_slice())
    }
}

impl std::fmt::Debug for Signer {
    /// Deliberately omits key material
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// The explicit key-export result of address generation
///
/// This is the single payload allowed to carry secret material out of the
/// process, and only because the caller asked for a new wallet.
#[derive(Debug, Clone)]
pub struct KeyBundle {
    pub address: String,
    pub public_key: String,
    pub secret_key: String,
    pub mnemonic: String,
}

/// Generate a new address, or re-derive one from an existing mnemonic
pub fn derive_address(phrase: Option<&str>) -> GatewayResult<KeyBundle> {
    let (signer, mnemonic) = match phrase {
        Some(phrase) => (Signer::from_mnemonic(phrase)?, phrase.to_string()),
        None => Signer::generate()?,
    };

    Ok(KeyBundle {
        address: signer.address()?.to_string(),
        public_key: signer.public_key(),
        secret_key: signer.secret_key(),
        mnemonic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::base58;
    use crate::types::Mutez;

    #[test]
    fn generated_keys_have_expected_encodings() {
        let bundle = derive_address(None).unwrap();
        assert!(bundle.address.starts_with("tz1"));
        assert!(bundle.public_key.starts_with("edpk"));
        assert!(bundle.secret_key.starts_with("edsk"));
        assert_eq!(bundle.mnemonic.split_whitespace().count(), 24);
    }

    #[test]
    fn derive_address_is_deterministic_per_mnemonic() {
        let first = derive_address(None).unwrap();
        let second = derive_address(Some(&first.mnemonic)).unwrap();
        assert_eq!(first.address, second.address);
        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.secret_key, second.secret_key);
    }

    #[test]
    fn secret_key_roundtrips_into_signer() {
        let bundle = derive_address(None).unwrap();
        let signer = Signer::from_secret_key(&bundle.secret_key).unwrap();
        assert_eq!(signer.public_key(), bundle.public_key);
        assert_eq!(signer.address().unwrap().to_string(), bundle.address);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (signer, _) = Signer::generate().unwrap();
        let message = b"arbitrary gateway message";
        let signature = signer.sign_message(message);
        assert!(signature.starts_with("edsig"));
        assert!(Signer::verify_message(
            message,
            &signature,
            &signer.public_key()
        ));
    }

    #[test]
    fn verify_rejects_wrong_message_and_key() {
        let (signer, _) = Signer::generate().unwrap();
        let (other, _) = Signer::generate().unwrap();
        let signature = signer.sign_message(b"original");

        assert!(!Signer::verify_message(
            b"tampered",
            &signature,
            &signer.public_key()
        ));
        assert!(!Signer::verify_message(
            b"original",
            &signature,
            &other.public_key()
        ));
        assert!(!Signer::verify_message(b"original", "edsig-garbage", &signer.public_key()));
        assert!(!Signer::verify_message(b"original", &signature, "edpk-garbage"));
    }

    #[test]
    fn operation_signing_is_deterministic() {
        let (signer, _) = Signer::generate().unwrap();
        let source = signer.address().unwrap();
        let branch = base58::encode(base58::Prefix::Block, &[1u8; 32]);
        let content = crate::forge::OperationContent::Delegation {
            source,
            delegate: None,
            limits: crate::forge::Limits {
                fee: Mutez(1_000),
                counter: 5,
                gas_limit: 1_000,
                storage_limit: 0,
            },
        };
        let forged = crate::forge::ForgedOperation::forge(&branch, vec![content]).unwrap();

        let signed_a = signer.sign_forged(forged.clone());
        let signed_b = signer.sign_forged(forged);
        assert_eq!(signed_a.operation_hash, signed_b.operation_hash);
        assert_eq!(signed_a.signature, signed_b.signature);
        assert_eq!(signed_a.signature.len(), 64);
    }

    #[test]
    fn bad_secret_key_rejected() {
        assert!(Signer::from_secret_key("not-a-key").is_err());
        assert!(Signer::from_secret_key("edskMangled11111111").is_err());
    }

    #[test]
    fn debug_output_omits_secrets() {
        let (signer, _) = Signer::generate().unwrap();
        let debug = format!("{signer:?}");
        assert!(!debug.contains("edsk"));
        assert!(debug.contains("edpk"));
    }
}
