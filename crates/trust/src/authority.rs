//! Device token validation authority.
//!
//! Validation recomputes the keyed MAC over the token payload using the
//! manufacturing secret and compares it to the embedded signature in
//! constant time. There is no update or rotation operation at runtime; a
//! new token implies re-manufacturing with a new device identifier.

use std::sync::Mutex;
use tracing::{debug, warn};

use crate::token::{DeviceToken, TOKEN_ENVELOPE_LEN};

/// Key-derivation context for the token MAC key.
const KEY_CONTEXT: &str = "orchard-trust 2025-06 device token v1";

/// Observability counters for token validation.
#[derive(Debug, Default, Clone)]
pub struct TokenMetrics {
    /// Tokens that validated successfully
    pub tokens_accepted_total: u64,
    /// Tokens rejected (malformed or MAC mismatch)
    pub tokens_rejected_total: u64,
}

/// Validates manufacturing-issued device tokens.
#[derive(Debug, Default)]
pub struct TokenAuthority {
    metrics: Mutex<TokenMetrics>,
}

impl TokenAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a decoded token against the manufacturing secret.
    ///
    /// Returns `false` — never an error — for any mismatch. Callers must
    /// treat `false` as an absolute stop: no downstream trust decision may
    /// proceed from an unvalidated device.
    pub fn validate(&self, token: &DeviceToken, secret: &[u8]) -> bool {
        let expected = Self::compute_mac(token, secret);
        // blake3 hash equality is constant-time
        let ok = expected == blake3::Hash::from_bytes(token.signature);
        if ok {
            debug!(device_id = %token.device_id, batch_id = %token.batch_id, "Device token accepted");
            self.metrics.lock().unwrap().tokens_accepted_total += 1;
        } else {
            warn!(device_id = %token.device_id, "Device token rejected: signature mismatch");
            self.metrics.lock().unwrap().tokens_rejected_total += 1;
        }
        ok
    }

    /// Validate a raw envelope. Malformed input is a rejection, not an error.
    pub fn validate_bytes(&self, raw: &[u8], secret: &[u8]) -> bool {
        match DeviceToken::decode(raw) {
            Ok(token) => self.validate(&token, secret),
            Err(e) => {
                warn!(len = raw.len(), error = %e, "Device token rejected: malformed envelope");
                self.metrics.lock().unwrap().tokens_rejected_total += 1;
                false
            }
        }
    }

    /// Issue a signed token.
    ///
    /// This is a manufacturing-time operation; runtime code only ever
    /// validates. It lives here so the issuer and validator can never
    /// disagree about the canonical payload encoding.
    pub fn issue(device_id: &str, batch_id: &str, issued_at: u64, secret: &[u8]) -> DeviceToken {
        let mut token = DeviceToken {
            device_id: device_id.to_string(),
            batch_id: batch_id.to_string(),
            issued_at,
            signature: [0u8; 32],
        };
        token.signature = *Self::compute_mac(&token, secret).as_bytes();
        token
    }

    fn compute_mac(token: &DeviceToken, secret: &[u8]) -> blake3::Hash {
        let key = blake3::derive_key(KEY_CONTEXT, secret);
        let input = DeviceToken::signing_input(&token.device_id, &token.batch_id, token.issued_at);
        blake3::keyed_hash(&key, &input)
    }

    /// Snapshot of the validation counters.
    pub fn metrics(&self) -> TokenMetrics {
        self.metrics.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_validates_under_same_secret() {
        let authority = TokenAuthority::new();
        let token = TokenAuthority::issue("SF-0001", "B2025-01", 1_750_000_000_000, b"k1");

        assert!(authority.validate(&token, b"k1"));
        assert!(!authority.validate(&token, b"k2"));
        let metrics = authority.metrics();
        assert_eq!(metrics.tokens_accepted_total, 1);
        assert_eq!(metrics.tokens_rejected_total, 1);
    }

    #[test]
    fn test_any_signature_bit_flip_invalidates() {
        let authority = TokenAuthority::new();
        let token = TokenAuthority::issue("SF-0001", "B2025-01", 1_750_000_000_000, b"k1");

        for byte in 0..32 {
            for bit in 0..8 {
                let mut mutated = token.clone();
                mutated.signature[byte] ^= 1 << bit;
                assert!(
                    !authority.validate(&mutated, b"k1"),
                    "bit flip at byte {byte} bit {bit} still validated"
                );
            }
        }
    }

    #[test]
    fn test_payload_mutation_invalidates() {
        let authority = TokenAuthority::new();
        let token = TokenAuthority::issue("SF-0001", "B2025-01", 1_750_000_000_000, b"k1");

        let mut wrong_device = token.clone();
        wrong_device.device_id = "SF-0002".to_string();
        assert!(!authority.validate(&wrong_device, b"k1"));

        let mut wrong_batch = token.clone();
        wrong_batch.batch_id = "B2025-02".to_string();
        assert!(!authority.validate(&wrong_batch, b"k1"));

        let mut wrong_time = token.clone();
        wrong_time.issued_at += 1;
        assert!(!authority.validate(&wrong_time, b"k1"));
    }

    #[test]
    fn test_envelope_bit_flips_never_validate() {
        let authority = TokenAuthority::new();
        let token = TokenAuthority::issue("SF-0001", "B2025-01", 1_750_000_000_000, b"k1");
        let raw = token.encode().unwrap();

        assert!(authority.validate_bytes(&raw, b"k1"));
        for byte in 0..raw.len() {
            let mut mutated = raw;
            mutated[byte] ^= 0x01;
            assert!(
                !authority.validate_bytes(&mutated, b"k1"),
                "envelope bit flip at byte {byte} still validated"
            );
        }
    }

    #[test]
    fn test_malformed_input_returns_false_not_error() {
        let authority = TokenAuthority::new();
        assert!(!authority.validate_bytes(&[], b"k1"));
        assert!(!authority.validate_bytes(&[0u8; 7], b"k1"));
        assert!(!authority.validate_bytes(&[0u8; TOKEN_ENVELOPE_LEN], b"k1"));
        assert_eq!(authority.metrics().tokens_rejected_total, 3);
    }
}
