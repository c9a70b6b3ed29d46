//! Persisted key layout. Each component owns its own prefix so no two
//! components ever write the same key.

pub const CACHE_PREFIX: &str = "cache:";
pub const COLLECTION_PREFIX: &str = "collection:";
pub const COLLECTIONS: &str = "collections";
pub const USER_DEFAULTS: &str = "user-defaults";
pub const MASTERY_INDEX: &str = "mastery-index";
pub const USAGE_STATS: &str = "usage-stats";
pub const CACHE_STATS: &str = "cache-stats";
/// Last collection and entry ids handed out; ids are never reused.
pub const ID_SEQUENCE: &str = "id-sequence";

/// `cache:{normalizedWord}`
#[must_use]
pub fn cache_key(normalized_word: &str) -> String {
    format!("{CACHE_PREFIX}{normalized_word}")
}

/// `collection:{id}`
#[must_use]
pub fn collection_key(collection_id: u64) -> String {
    format!("{COLLECTION_PREFIX}{collection_id}")
}

#[must_use]
pub fn parse_cache_key(key: &str) -> Option<&str> {
    key.strip_prefix(CACHE_PREFIX).filter(|w| !w.is_empty())
}

#[must_use]
pub fn parse_collection_key(key: &str) -> Option<u64> {
    key.strip_prefix(COLLECTION_PREFIX)?.parse().ok()
}
