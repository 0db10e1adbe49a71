//! Master key storage and authenticated encryption of at-rest secrets.
//!
//! The master key is generated locally on first use and persisted with
//! owner-only access. Secrets are sealed with ChaCha20-Poly1305; the random
//! 96-bit nonce is prepended to the ciphertext. Key material is zeroized on
//! drop.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use std::path::Path;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

/// Key length in bytes.
pub const KEY_LEN: usize = 32;
/// Nonce length for ChaCha20-Poly1305 (96 bits).
const NONCE_LEN: usize = 12;

/// Locally generated symmetric master key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Load the key from `path`, generating and persisting a new one if the
    /// file does not exist. The file is written with owner-only permissions.
    pub fn load_or_generate(path: &Path) -> VaultResult<Self> {
        if path.exists() {
            let raw = std::fs::read(path)?;
            let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| {
                VaultError::KeyStore(format!("master key at {} has wrong length", path.display()))
            })?;
            return Ok(Self { bytes });
        }

        let key = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, key.bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        info!(path = %path.display(), "Generated new master key");
        Ok(key)
    }
}

/// Seals and opens small secrets under the master key.
pub struct SecretSealer {
    cipher: ChaCha20Poly1305,
}

impl SecretSealer {
    pub fn new(key: &MasterKey) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.bytes));
        Self { cipher }
    }

    /// Encrypt a secret. Output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::Crypto(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a sealed secret, authenticating it in the process.
    pub fn decrypt(&self, sealed: &[u8]) -> VaultResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(VaultError::Crypto("sealed secret too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| VaultError::Crypto(format!("decryption failed: {e}")))
    }
}
