//! Credential vault for the Orchard access layer.
//!
//! Operator passwords are hashed with Argon2id and only ever hashed — never
//! reversibly encrypted. Small at-rest secrets other than passwords go
//! through authenticated symmetric encryption under a locally generated
//! master key. Password policy and strength scoring gate what the vault
//! will accept.

pub mod error;
pub mod hash;
pub mod policy;
pub mod sealed;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use hash::PasswordHasherConfig;
pub use policy::{PasswordPolicy, PolicyVerdict};
pub use sealed::{MasterKey, SecretSealer};
pub use vault::CredentialVault;
