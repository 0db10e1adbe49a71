//! The credential vault facade.

use std::path::Path;

use orchard_core::config::PolicyConfig;

use crate::error::VaultResult;
use crate::hash::{self, PasswordHasherConfig};
use crate::policy::{PasswordPolicy, PolicyVerdict};
use crate::sealed::{MasterKey, SecretSealer};

/// Hashing, policy, and sealing behind one interface.
///
/// Cryptographic state is loaded once at construction; all methods take
/// `&self` and are safe to call concurrently.
pub struct CredentialVault {
    policy: PasswordPolicy,
    hasher_config: PasswordHasherConfig,
    sealer: SecretSealer,
}

impl CredentialVault {
    /// Open the vault, loading (or generating) the master key at
    /// `master_key_path`.
    pub fn open(policy_config: PolicyConfig, master_key_path: &Path) -> VaultResult<Self> {
        let key = MasterKey::load_or_generate(master_key_path)?;
        Ok(Self::with_master_key(policy_config, key))
    }

    /// Build a vault around an already-loaded master key.
    pub fn with_master_key(policy_config: PolicyConfig, key: MasterKey) -> Self {
        Self {
            policy: PasswordPolicy::new(policy_config),
            hasher_config: PasswordHasherConfig::default(),
            sealer: SecretSealer::new(&key),
        }
    }

    /// Override the hashing cost parameters (tests use cheaper ones).
    pub fn with_hasher_config(mut self, config: PasswordHasherConfig) -> Self {
        self.hasher_config = config;
        self
    }

    /// Hash a password into a self-describing encoded string.
    pub fn hash_password(&self, plaintext: &str) -> VaultResult<String> {
        hash::hash_password(plaintext, &self.hasher_config)
    }

    /// Constant-time password verification. Corrupt hashes verify `false`.
    pub fn verify_password(&self, plaintext: &str, encoded: &str) -> bool {
        hash::verify_password(plaintext, encoded)
    }

    /// Whether a stored hash should be re-hashed under current parameters.
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        hash::needs_rehash(encoded, &self.hasher_config)
    }

    /// Check a candidate password against the configured policy.
    pub fn validate_policy(&self, plaintext: &str, personal: &[&str]) -> PolicyVerdict {
        self.policy.validate(plaintext, personal)
    }

    /// Generate a policy-satisfying random password.
    pub fn generate_password(&self, length: usize) -> String {
        self.policy.generate(length)
    }

    /// Seal a small at-rest secret (never a password).
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        self.sealer.encrypt(plaintext)
    }

    /// Open a sealed secret.
    pub fn decrypt(&self, sealed: &[u8]) -> VaultResult<Vec<u8>> {
        self.sealer.decrypt(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::with_master_key(PolicyConfig::default(), MasterKey::generate())
            .with_hasher_config(PasswordHasherConfig {
                memory_kib: 8 * 1024,
                iterations: 1,
                parallelism: 1,
            })
    }

    #[test]
    fn test_hash_and_verify_through_facade() {
        let vault = test_vault();
        let hash = vault.hash_password("Mint-Orchard!9Harvest").unwrap();
        assert!(vault.verify_password("Mint-Orchard!9Harvest", &hash));
        assert!(!vault.verify_password("Mint-Orchard!9harvest", &hash));
        assert!(!vault.needs_rehash(&hash));
    }

    #[test]
    fn test_policy_then_hash_flow() {
        let vault = test_vault();
        let password = vault.generate_password(16);
        let verdict = vault.validate_policy(&password, &[]);
        assert!(verdict.ok);
        let hash = vault.hash_password(&password).unwrap();
        assert!(vault.verify_password(&password, &hash));
    }

    #[test]
    fn test_secret_round_trip() {
        let vault = test_vault();
        let sealed = vault.encrypt(b"totp-seed").unwrap();
        assert_eq!(vault.decrypt(&sealed).unwrap(), b"totp-seed");
    }
}
