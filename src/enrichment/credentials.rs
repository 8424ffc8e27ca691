//! Cached access credential for a third-party metadata provider.
//!
//! The cache is shared by everything talking to the provider. A token is
//! handed out until it is about to expire, then the next caller refreshes
//! it. Concurrent refreshes are not coordinated: each refreshing caller
//! stores its own token and the last one written wins.
//!
//! Nothing in this crate calls the provider. The image and metadata fetcher
//! that consumes `ImportReport::image_fetch_requests` lives outside it and
//! builds one `CredentialCache` per provider, sharing it between its workers.

use anyhow::Result;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Tokens are considered expired this long before the provider says so.
pub const EXPIRY_SAFETY_BUFFER: Duration = Duration::from_secs(60);

/// A token as returned by the provider.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub expires_in: Duration,
}

#[derive(Debug)]
struct CachedCredential {
    token: String,
    valid_until: Instant,
}

#[derive(Debug)]
pub struct CredentialCache {
    cached: RwLock<Option<CachedCredential>>,
    safety_buffer: Duration,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_safety_buffer(EXPIRY_SAFETY_BUFFER)
    }

    pub fn with_safety_buffer(safety_buffer: Duration) -> Self {
        Self {
            cached: RwLock::new(None),
            safety_buffer,
        }
    }

    /// Returns the cached token if it is still valid.
    pub fn current(&self) -> Option<String> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|c| Instant::now() < c.valid_until)
            .map(|c| c.token.clone())
    }

    /// Caches a freshly issued token and returns it.
    pub fn store(&self, issued: IssuedCredential) -> String {
        let valid_for = issued.expires_in.saturating_sub(self.safety_buffer);
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(CachedCredential {
            token: issued.token.clone(),
            valid_until: Instant::now() + valid_for,
        });
        debug!("Cached provider credential valid for {:?}", valid_for);
        issued.token
    }

    /// Returns a valid token, calling `refresh` to obtain a new one when the
    /// cached token is missing or expired. A failed refresh leaves the cache
    /// untouched.
    pub fn get_or_refresh<F>(&self, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Result<IssuedCredential>,
    {
        if let Some(token) = self.current() {
            return Ok(token);
        }
        let issued = refresh()?;
        Ok(self.store(issued))
    }

    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
