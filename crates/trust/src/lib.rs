//! Device authenticity validation for Orchard hardware.
//!
//! Every manufactured unit carries a signed token binding its device
//! identifier and production batch. This crate validates those tokens
//! against the manufacturing secret; a failed validation means the device
//! is untrusted and no downstream trust decision may proceed.

pub mod authority;
pub mod token;

pub use authority::{TokenAuthority, TokenMetrics};
pub use token::{DeviceToken, TokenDecodeError, SIGNATURE_LEN, TOKEN_ENVELOPE_LEN};
