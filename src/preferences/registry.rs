//! Reserved preference keys.
//!
//! Every rule about which keys hold server-managed AI cache data, and which
//! setting changes invalidate that data, lives here. Nothing else in the
//! crate matches key names by hand.

use serde_json::{Map, Value};

/// A group of preference keys holding cached AI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    /// A single key.
    Exact(&'static str),
    /// Every key starting with the prefix.
    Prefix(&'static str),
}

impl CacheNamespace {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            CacheNamespace::Exact(name) => key == *name,
            CacheNamespace::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

pub const PROFILE_CRITIQUES: CacheNamespace = CacheNamespace::Exact("profile_critiques");
pub const AI_PLAYLISTS_CACHE: CacheNamespace = CacheNamespace::Exact("ai_playlists_cache");
pub const TRACK_CRITIQUES: CacheNamespace = CacheNamespace::Prefix("comet_ai_track_");
pub const PROFILE_CRITIQUE_ENTRIES: CacheNamespace = CacheNamespace::Prefix("comet_ai_profile_");

pub const CACHE_NAMESPACES: &[CacheNamespace] = &[
    PROFILE_CRITIQUES,
    AI_PLAYLISTS_CACHE,
    TRACK_CRITIQUES,
    PROFILE_CRITIQUE_ENTRIES,
];

/// A setting whose change makes cached output stale.
#[derive(Debug)]
pub struct InvalidationTrigger {
    pub key: &'static str,
    pub invalidates: &'static [CacheNamespace],
}

pub const INVALIDATION_TRIGGERS: &[InvalidationTrigger] = &[
    InvalidationTrigger {
        key: "profile_critique_prompt",
        invalidates: &[PROFILE_CRITIQUES, PROFILE_CRITIQUE_ENTRIES],
    },
    InvalidationTrigger {
        key: "ai_critique_prompt",
        invalidates: &[TRACK_CRITIQUES],
    },
    InvalidationTrigger {
        key: "ai_playlists_prompt",
        invalidates: &[AI_PLAYLISTS_CACHE],
    },
];

pub fn is_cache_key(key: &str) -> bool {
    CACHE_NAMESPACES.iter().any(|ns| ns.matches(key))
}

pub fn trigger_for(key: &str) -> Option<&'static InvalidationTrigger> {
    INVALIDATION_TRIGGERS.iter().find(|t| t.key == key)
}

/// Returns a copy of `preferences` without any cache key.
pub fn without_cache_keys(preferences: &Map<String, Value>) -> Map<String, Value> {
    preferences
        .iter()
        .filter(|(key, _)| !is_cache_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Returns only the cache entries of `preferences`.
pub fn cache_entries(preferences: &Map<String, Value>) -> Map<String, Value> {
    preferences
        .iter()
        .filter(|(key, _)| is_cache_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Removes every key matched by one of `namespaces`, returning how many were
/// removed.
pub fn remove_namespaces(preferences: &mut Map<String, Value>, namespaces: &[CacheNamespace]) -> usize {
    let before = preferences.len();
    preferences.retain(|key, _| !namespaces.iter().any(|ns| ns.matches(key)));
    before - preferences.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_cache_keys() {
        assert!(is_cache_key("profile_critiques"));
        assert!(is_cache_key("ai_playlists_cache"));
        assert!(is_cache_key("comet_ai_track_42"));
        assert!(is_cache_key("comet_ai_profile_2024"));
        assert!(!is_cache_key("profile_critiques_extra"));
        assert!(!is_cache_key("ai_critique_prompt"));
        assert!(!is_cache_key("theme"));
    }

    #[test]
    fn every_trigger_targets_registered_namespaces() {
        for trigger in INVALIDATION_TRIGGERS {
            assert!(!is_cache_key(trigger.key));
            for ns in trigger.invalidates {
                assert!(CACHE_NAMESPACES.contains(ns));
            }
        }
        assert!(trigger_for("ai_critique_prompt").is_some());
        assert!(trigger_for("language").is_none());
    }

    #[test]
    fn splits_cache_and_settings() {
        let prefs = json!({
            "language": "en",
            "comet_ai_track_1": "great",
            "profile_critiques": ["meh"],
        });
        let prefs = prefs.as_object().unwrap();

        let settings = without_cache_keys(prefs);
        assert_eq!(settings.len(), 1);
        assert!(settings.contains_key("language"));

        let cache = cache_entries(prefs);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("language"));
    }

    #[test]
    fn removes_whole_namespaces() {
        let mut prefs = json!({
            "comet_ai_track_1": 1,
            "comet_ai_track_2": 2,
            "comet_ai_profile_1": 3,
            "language": "en",
        })
        .as_object()
        .unwrap()
        .clone();

        assert_eq!(remove_namespaces(&mut prefs, &[TRACK_CRITIQUES]), 2);
        assert_eq!(prefs.len(), 2);
        assert_eq!(remove_namespaces(&mut prefs, &[TRACK_CRITIQUES]), 0);
    }
}
