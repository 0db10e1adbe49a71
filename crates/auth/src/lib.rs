//! Operator authentication and session management for the Orchard device.
//!
//! Logins are verified through the credential vault; outcomes are written
//! to the audit log before they are returned. Sessions, failed-attempt
//! counts, and lockouts live in three independently locked registries, and
//! a background sweep reclaims idle sessions without requiring traffic.

pub mod authenticator;
pub mod error;
pub mod registry;
pub mod store;
pub mod sweep;
pub mod types;

pub use authenticator::SessionAuthenticator;
pub use error::AuthError;
pub use registry::{FailedAttempts, LockoutTable, SessionRegistry};
pub use store::CredentialStore;
pub use sweep::SessionSweeper;
pub use types::{AuthResult, Credential, Role, SessionToken};
