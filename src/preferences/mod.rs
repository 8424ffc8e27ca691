//! Per-user preferences bag.
//!
//! Preferences are an opaque JSON object stored as text. The only keys this
//! crate interprets are the ones listed in [`registry`].

mod merge;
pub mod registry;

pub use merge::{merge_client_preferences, MergeOutcome};

use crate::library_store::UserBlobStore;
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Loads the stored preferences of a user.
///
/// A missing blob is an empty map. So is a blob that is not a JSON object,
/// which is logged and otherwise ignored.
pub fn load_preferences<S: UserBlobStore + ?Sized>(
    store: &S,
    user_id: usize,
) -> Result<Map<String, Value>> {
    let Some(raw) = store.get_user_preferences(user_id)? else {
        return Ok(Map::new());
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            warn!("Preferences of user {} are not a JSON object, ignoring them", user_id);
            Ok(Map::new())
        }
        Err(e) => {
            warn!("Failed to parse preferences of user {}: {}", user_id, e);
            Ok(Map::new())
        }
    }
}

pub fn store_preferences<S: UserBlobStore + ?Sized>(
    store: &S,
    user_id: usize,
    preferences: &Map<String, Value>,
) -> Result<()> {
    let data = serde_json::to_string(preferences).context("Failed to serialize preferences")?;
    store.save_user_preferences(user_id, &data)
}

/// Applies a settings edit submitted by a client and returns how many cached
/// entries were invalidated.
///
/// The read-modify-write is not atomic: two concurrent saves for the same
/// user race and the last one wins.
pub fn save_client_preferences<S: UserBlobStore + ?Sized>(
    store: &S,
    user_id: usize,
    incoming: Map<String, Value>,
) -> Result<usize> {
    let stored = load_preferences(store, user_id)?;
    let outcome = merge_client_preferences(stored, incoming);
    store_preferences(store, user_id, &outcome.preferences)?;
    info!(
        "Saved preferences of user {} ({} cached entries invalidated)",
        user_id, outcome.cleared
    );
    Ok(outcome.cleared)
}

/// Drops every cached AI entry of a user, returning how many were removed.
pub fn clear_ai_cache<S: UserBlobStore + ?Sized>(store: &S, user_id: usize) -> Result<usize> {
    let mut preferences = load_preferences(store, user_id)?;
    let cleared = registry::remove_namespaces(&mut preferences, registry::CACHE_NAMESPACES);
    store_preferences(store, user_id, &preferences)?;
    info!("Cleared {} cached AI entries of user {}", cleared, user_id);
    Ok(cleared)
}

pub fn export_ai_cache<S: UserBlobStore + ?Sized>(
    store: &S,
    user_id: usize,
) -> Result<Map<String, Value>> {
    let preferences = load_preferences(store, user_id)?;
    let cache = registry::cache_entries(&preferences);
    info!("Exporting {} cached AI entries of user {}", cache.len(), user_id);
    Ok(cache)
}

/// Writes one cached AI entry. This is the only way cache keys get into the
/// preferences bag.
pub fn put_cache_entry<S: UserBlobStore + ?Sized>(
    store: &S,
    user_id: usize,
    key: &str,
    value: Value,
) -> Result<()> {
    if !registry::is_cache_key(key) {
        bail!("'{}' is not a cache key", key);
    }
    let mut preferences = load_preferences(store, user_id)?;
    preferences.insert(key.to_string(), value);
    store_preferences(store, user_id, &preferences)
}
