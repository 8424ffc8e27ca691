//! Shared state for talking to third-party metadata providers.

pub mod credentials;

pub use credentials::{CredentialCache, IssuedCredential, EXPIRY_SAFETY_BUFFER};
