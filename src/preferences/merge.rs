use super::registry::{is_cache_key, remove_namespaces, trigger_for, CacheNamespace};
use serde_json::{Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub preferences: Map<String, Value>,
    /// Number of cached entries dropped because a setting they depend on
    /// changed.
    pub cleared: usize,
}

/// Merges a client-submitted preferences object into the stored one.
///
/// Cache keys sent by the client are ignored: cached AI output is owned by
/// the server and a stale client copy must not overwrite it. Every other key
/// is applied. When a trigger setting ends up with a different value than the
/// stored one (a missing stored value counts as different), all cached
/// entries depending on it are dropped.
pub fn merge_client_preferences(
    stored: Map<String, Value>,
    incoming: Map<String, Value>,
) -> MergeOutcome {
    let mut preferences = stored;
    let mut dirty: Vec<CacheNamespace> = Vec::new();

    for (key, value) in incoming {
        if is_cache_key(&key) {
            debug!("Ignoring client supplied cache key {}", key);
            continue;
        }
        if let Some(trigger) = trigger_for(&key) {
            if preferences.get(&key) != Some(&value) {
                debug!("Setting {} changed, invalidating dependent cache", key);
                dirty.extend_from_slice(trigger.invalidates);
            }
        }
        preferences.insert(key, value);
    }

    let cleared = if dirty.is_empty() {
        0
    } else {
        remove_namespaces(&mut preferences, &dirty)
    };
    if cleared > 0 {
        info!("Invalidated {} cached AI entries", cleared);
    }

    MergeOutcome {
        preferences,
        cleared,
    }
}
