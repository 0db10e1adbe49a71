//! Fixed-layout device token envelope.
//!
//! The token is produced once at manufacturing time and written to the
//! system partition. Layout (120 bytes, all integers little-endian):
//!
//! | offset | len | field      |
//! |--------|-----|------------|
//! | 0      | 4   | magic `ODT1` |
//! | 4      | 1   | version (1)  |
//! | 5      | 3   | reserved (zero) |
//! | 8      | 48  | device_id, UTF-8, zero-padded |
//! | 56     | 24  | batch_id, UTF-8, zero-padded |
//! | 80     | 8   | issued_at, epoch milliseconds |
//! | 88     | 32  | signature |

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Envelope magic bytes.
pub const MAGIC: [u8; 4] = *b"ODT1";
/// Current envelope version.
pub const VERSION: u8 = 1;
/// Signature length in bytes.
pub const SIGNATURE_LEN: usize = 32;
/// Total envelope length in bytes.
pub const TOKEN_ENVELOPE_LEN: usize = 120;

const DEVICE_ID_LEN: usize = 48;
const BATCH_ID_LEN: usize = 24;

/// Errors produced while decoding a token envelope.
///
/// Decode errors never escape [`TokenAuthority::validate`]; they exist so
/// tooling can report *why* an envelope is malformed.
///
/// [`TokenAuthority::validate`]: crate::authority::TokenAuthority::validate
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("envelope length {0} (expected {TOKEN_ENVELOPE_LEN})")]
    Length(usize),
    #[error("bad magic")]
    Magic,
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("malformed {0} field")]
    Field(&'static str),
}

/// A manufacturing-issued device token. Immutable once issued; a new token
/// implies re-manufacturing with a new device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken {
    /// Device identifier (serial)
    pub device_id: String,
    /// Production batch identifier
    pub batch_id: String,
    /// Issuance timestamp (epoch milliseconds)
    pub issued_at: u64,
    /// Keyed MAC over the canonical payload
    pub signature: [u8; SIGNATURE_LEN],
}

impl DeviceToken {
    /// Canonical byte encoding of the signed payload.
    ///
    /// Fields are length-prefixed so no two distinct payloads share an
    /// encoding.
    pub fn signing_input(device_id: &str, batch_id: &str, issued_at: u64) -> Vec<u8> {
        let mut input = Vec::with_capacity(device_id.len() + batch_id.len() + 12);
        input.extend_from_slice(&(device_id.len() as u16).to_le_bytes());
        input.extend_from_slice(device_id.as_bytes());
        input.extend_from_slice(&(batch_id.len() as u16).to_le_bytes());
        input.extend_from_slice(batch_id.as_bytes());
        input.extend_from_slice(&issued_at.to_le_bytes());
        input
    }

    /// Encode the fixed-layout envelope.
    pub fn encode(&self) -> Result<[u8; TOKEN_ENVELOPE_LEN], TokenDecodeError> {
        if self.device_id.is_empty() || self.device_id.len() > DEVICE_ID_LEN {
            return Err(TokenDecodeError::Field("device_id"));
        }
        if self.batch_id.is_empty() || self.batch_id.len() > BATCH_ID_LEN {
            return Err(TokenDecodeError::Field("batch_id"));
        }

        let mut buf = [0u8; TOKEN_ENVELOPE_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = VERSION;
        buf[8..8 + self.device_id.len()].copy_from_slice(self.device_id.as_bytes());
        buf[56..56 + self.batch_id.len()].copy_from_slice(self.batch_id.as_bytes());
        buf[80..88].copy_from_slice(&self.issued_at.to_le_bytes());
        buf[88..120].copy_from_slice(&self.signature);
        Ok(buf)
    }

    /// Decode a fixed-layout envelope, rejecting any structural deviation.
    pub fn decode(raw: &[u8]) -> Result<Self, TokenDecodeError> {
        if raw.len() != TOKEN_ENVELOPE_LEN {
            return Err(TokenDecodeError::Length(raw.len()));
        }
        if raw[0..4] != MAGIC {
            return Err(TokenDecodeError::Magic);
        }
        if raw[4] != VERSION {
            return Err(TokenDecodeError::Version(raw[4]));
        }

        let device_id = decode_padded_field(&raw[8..8 + DEVICE_ID_LEN], "device_id")?;
        let batch_id = decode_padded_field(&raw[56..56 + BATCH_ID_LEN], "batch_id")?;
        let issued_at = u64::from_le_bytes(raw[80..88].try_into().expect("fixed slice"));
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&raw[88..120]);

        Ok(Self {
            device_id,
            batch_id,
            issued_at,
            signature,
        })
    }

    /// Read a token envelope from the device token file.
    pub fn read_from(path: &Path) -> std::io::Result<Result<Self, TokenDecodeError>> {
        let raw = std::fs::read(path)?;
        Ok(Self::decode(&raw))
    }

    /// Write the token envelope to a file.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let buf = self
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, buf)
    }
}

/// A zero-padded UTF-8 field: content up to the first zero byte, the
/// remainder must be entirely zero.
fn decode_padded_field(raw: &[u8], name: &'static str) -> Result<String, TokenDecodeError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if end == 0 {
        return Err(TokenDecodeError::Field(name));
    }
    if raw[end..].iter().any(|&b| b != 0) {
        return Err(TokenDecodeError::Field(name));
    }
    std::str::from_utf8(&raw[..end])
        .map(str::to_string)
        .map_err(|_| TokenDecodeError::Field(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token() -> DeviceToken {
        DeviceToken {
            device_id: "SF-0001".to_string(),
            batch_id: "B2025-01".to_string(),
            issued_at: 1_750_000_000_000,
            signature: [7u8; SIGNATURE_LEN],
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let token = sample_token();
        let raw = token.encode().unwrap();
        assert_eq!(raw.len(), TOKEN_ENVELOPE_LEN);
        let decoded = DeviceToken::decode(&raw).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            DeviceToken::decode(&[0u8; 16]),
            Err(TokenDecodeError::Length(16))
        );
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut raw = sample_token().encode().unwrap();
        raw[0] = b'X';
        assert_eq!(DeviceToken::decode(&raw), Err(TokenDecodeError::Magic));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut raw = sample_token().encode().unwrap();
        raw[4] = 9;
        assert_eq!(DeviceToken::decode(&raw), Err(TokenDecodeError::Version(9)));
    }

    #[test]
    fn test_decode_rejects_garbage_in_padding() {
        let mut raw = sample_token().encode().unwrap();
        // Byte after the device_id terminator must be zero
        raw[8 + "SF-0001".len() + 1] = 0xAA;
        assert_eq!(
            DeviceToken::decode(&raw),
            Err(TokenDecodeError::Field("device_id"))
        );
    }

    #[test]
    fn test_decode_rejects_empty_device_id() {
        let mut raw = sample_token().encode().unwrap();
        for b in raw[8..56].iter_mut() {
            *b = 0;
        }
        assert_eq!(
            DeviceToken::decode(&raw),
            Err(TokenDecodeError::Field("device_id"))
        );
    }

    #[test]
    fn test_encode_rejects_oversized_fields() {
        let mut token = sample_token();
        token.device_id = "x".repeat(49);
        assert_eq!(token.encode(), Err(TokenDecodeError::Field("device_id")));
    }

    #[test]
    fn test_signing_input_is_unambiguous() {
        // ("ab", "c") and ("a", "bc") must not collide
        let one = DeviceToken::signing_input("ab", "c", 0);
        let two = DeviceToken::signing_input("a", "bc", 0);
        assert_ne!(one, two);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("device.token");
        let token = sample_token();
        token.write_to(&path).unwrap();
        let loaded = DeviceToken::read_from(&path).unwrap().unwrap();
        assert_eq!(loaded, token);
    }
}
