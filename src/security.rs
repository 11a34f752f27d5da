//! Input validation and log sanitization
//!
//! Validation runs before any network traffic so malformed caller input
//! never reaches a node. Sanitization strips key material and mnemonics
//! from anything that could end up in a log line or an error payload.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GatewayError, GatewayResult};

/// Implicit account address (tz1 ed25519, tz2 secp256k1, tz3 p256)
static IMPLICIT_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^tz[123][1-9A-HJ-NP-Za-km-z]{33}$").expect("valid regex"));

/// Originated contract address
static CONTRACT_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^KT1[1-9A-HJ-NP-Za-km-z]{33}$").expect("valid regex"));

/// Operation hash
static OPERATION_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^o[1-9A-HJ-NP-Za-km-z]{50}$").expect("valid regex"));

/// Entry point names: alphanumeric + underscore, not starting with a digit
static ENTRY_POINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"));

/// Encoded secret keys
static SECRET_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(edsk|spsk|p2sk)[1-9A-HJ-NP-Za-km-z]{20,}\b").expect("valid regex"));

/// Long base58 runs (potential key material in upstream error text)
static LONG_BASE58: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{50,}\b").expect("valid regex"));

/// URLs carrying inline credentials
static CREDENTIAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^:/\s]+:[^@\s]+@\S+").expect("valid regex"));

/// 12+ lowercase words in a row, the shape of a BIP39 phrase
static MNEMONIC_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z]{3,}(?:\s+[a-z]{3,}){11,}\b").expect("valid regex"));

/// Maximum operations per history query
pub const MAX_QUERY_LIMIT: u32 = 100;

/// Maximum transferable amount in a single request (1M ꜩ)
pub const MAX_AMOUNT_MUTEZ: u64 = 1_000_000_000_000;

/// Maximum length of a named entry point on chain
pub const MAX_ENTRY_POINT_LEN: usize = 31;

/// Check that a string is a well-formed implicit or contract address
pub fn is_valid_address(address: &str) -> bool {
    IMPLICIT_ADDRESS.is_match(address) || CONTRACT_ADDRESS.is_match(address)
}

/// Check that a string is a well-formed implicit (tz) address
pub fn is_implicit_address(address: &str) -> bool {
    IMPLICIT_ADDRESS.is_match(address)
}

/// Check that a string is a well-formed contract (KT1) address
pub fn is_contract_address(address: &str) -> bool {
    CONTRACT_ADDRESS.is_match(address)
}

/// Check that a string is a well-formed operation hash
pub fn is_operation_hash(hash: &str) -> bool {
    OPERATION_HASH.is_match(hash)
}

/// Validate an entry point name
///
/// The chain matches entry points case-sensitively; no normalization
/// happens here, only shape checks.
pub fn validate_entry_point(entry_point: &str) -> GatewayResult<()> {
    if entry_point.is_empty() {
        return Err(GatewayError::validation("entry_point must be non-empty"));
    }
    if entry_point.len() > MAX_ENTRY_POINT_LEN {
        return Err(GatewayError::validation(format!(
            "entry_point too long: {} chars (maximum: {})",
            entry_point.len(),
            MAX_ENTRY_POINT_LEN
        )));
    }
    if !ENTRY_POINT.is_match(entry_point) {
        return Err(GatewayError::validation(format!(
            "invalid entry_point format: {entry_point}"
        )));
    }
    Ok(())
}

/// Validate an amount in mutez against the configured ceiling
pub fn validate_amount(amount: u64) -> GatewayResult<u64> {
    if amount > MAX_AMOUNT_MUTEZ {
        return Err(GatewayError::validation(format!(
            "amount too large: {amount} mutez (maximum: {MAX_AMOUNT_MUTEZ})"
        )));
    }
    Ok(amount)
}

/// Validate a history-query limit
pub fn validate_limit(limit: u32) -> GatewayResult<u32> {
    if limit == 0 {
        return Err(GatewayError::validation("limit must be positive"));
    }
    if limit > MAX_QUERY_LIMIT {
        return Err(GatewayError::validation(format!(
            "limit too large: {limit} (maximum: {MAX_QUERY_LIMIT})"
        )));
    }
    Ok(limit)
}

/// Sanitize error text before it leaves the process
///
/// Upstream node errors occasionally echo request fragments back; strip
/// anything that looks like key material or credentials, then truncate.
pub fn sanitize_error_message(message: &str) -> String {
    let out = SECRET_KEY.replace_all(message, "[REDACTED]");
    let out = LONG_BASE58.replace_all(&out, "[REDACTED]");
    let out = CREDENTIAL_URL.replace_all(&out, "https://[REDACTED]");

    let mut out = out.into_owned();
    if out.len() > 400 {
        let cut = out
            .char_indices()
            .take_while(|(i, _)| *i <= 400)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        out.truncate(cut);
        out.push_str("...");
    }
    out
}

/// Sanitize a message before logging
///
/// Redacts encoded secret keys and anything shaped like a mnemonic phrase.
pub fn sanitize_log_message(message: &str) -> String {
    let out = SECRET_KEY.replace_all(message, "[REDACTED]");
    let out = MNEMONIC_RUN.replace_all(&out, "[MNEMONIC]");
    out.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_addresses_accepted() {
        assert!(is_valid_address("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
        assert!(is_implicit_address("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
        assert!(is_valid_address("KT1BEqzn5Wx8uJrZNvuS9DVHmLvG9td3fDLi"));
        assert!(is_contract_address("KT1BEqzn5Wx8uJrZNvuS9DVHmLvG9td3fDLi"));
    }

    #[test]
    fn malformed_addresses_rejected() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("tz1short"));
        assert!(!is_valid_address("tz4VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
        // 0, O, I, l are outside the base58 alphabet
        assert!(!is_valid_address("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcj0"));
        assert!(!is_contract_address("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
    }

    #[test]
    fn entry_point_validation() {
        assert!(validate_entry_point("transfer").is_ok());
        assert!(validate_entry_point("update_operators").is_ok());
        assert!(validate_entry_point("_internal").is_ok());

        assert!(validate_entry_point("").is_err());
        assert!(validate_entry_point("1transfer").is_err());
        assert!(validate_entry_point("trans fer").is_err());
        assert!(validate_entry_point(&"x".repeat(40)).is_err());
    }

    #[test]
    fn amount_bounds() {
        assert!(validate_amount(0).is_ok());
        assert!(validate_amount(MAX_AMOUNT_MUTEZ).is_ok());
        assert!(validate_amount(MAX_AMOUNT_MUTEZ + 1).is_err());
    }

    #[test]
    fn limit_bounds() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(100).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(101).is_err());
    }

    #[test]
    fn secret_keys_redacted() {
        let msg = "request failed for key edsk3gUfUPyBSfrS9CCgmCiQsTCHGkviBDusMxDJstFtojtc1";
        let clean = sanitize_log_message(msg);
        assert!(!clean.contains("edsk3"));
        assert!(clean.contains("[REDACTED]"));
    }

    #[test]
    fn mnemonics_redacted() {
        let msg = "leaked phrase: abandon abandon abandon abandon abandon abandon \
                   abandon abandon abandon abandon abandon about";
        let clean = sanitize_log_message(msg);
        assert!(clean.contains("[MNEMONIC]"));
        assert!(!clean.contains("abandon abandon"));
    }

    #[test]
    fn error_messages_truncated() {
        let long = "x".repeat(1000);
        let clean = sanitize_error_message(&long);
        assert!(clean.len() < 1000);
        assert!(clean.ends_with("..."));
    }

    #[test]
    fn operation_hash_shape() {
        assert!(is_operation_hash(
            "oo6JPEAy8VuMRGaFuMmLNFFGdJgiaKfnmT1CpHJfKP3Ye5ZahiP"
        ));
        assert!(!is_operation_hash("not-a-hash"));
    }
}
