//! Argon2id password hashing with explicit, tunable cost parameters.
//!
//! Parameters are embedded in the PHC-format output, so verification stays
//! correct when the defaults change later; `needs_rehash` detects hashes
//! produced under older parameters so an unchanged password can be silently
//! re-hashed on the next successful login.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use tracing::warn;

use crate::error::{VaultError, VaultResult};

/// Cost parameters for password hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasherConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iteration count
    pub iterations: u32,
    /// Lane count
    pub parallelism: u32,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 2,
            parallelism: 4,
        }
    }
}

impl PasswordHasherConfig {
    fn params(&self) -> VaultResult<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, Some(32))
            .map_err(|e| VaultError::Hash(e.to_string()))
    }

    fn hasher(&self) -> VaultResult<Argon2<'static>> {
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params()?))
    }
}

/// Hash a password into a self-describing PHC string.
///
/// A fresh random salt is generated per call, so hashing the same password
/// twice yields different encodings that both verify.
pub fn hash_password(plaintext: &str, config: &PasswordHasherConfig) -> VaultResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = config
        .hasher()?
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| VaultError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against an encoded hash in constant time.
///
/// A wrong password and a corrupt or unsupported hash are distinguished
/// only in the logs — the returned boolean is `false` for both.
pub fn verify_password(plaintext: &str, encoded: &str) -> bool {
    let parsed = match PasswordHash::new(encoded) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored password hash is corrupt or unsupported");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Whether an encoded hash was produced under parameters other than the
/// current configuration.
pub fn needs_rehash(encoded: &str, config: &PasswordHasherConfig) -> bool {
    let parsed = match PasswordHash::new(encoded) {
        Ok(parsed) => parsed,
        // A corrupt hash can only be replaced by re-hashing
        Err(_) => return true,
    };
    if parsed.algorithm.as_str() != "argon2id" {
        return true;
    }
    match Params::try_from(&parsed) {
        Ok(params) => {
            params.m_cost() != config.memory_kib
                || params.t_cost() != config.iterations
                || params.p_cost() != config.parallelism
        }
        Err(_) => true,
    }
}
