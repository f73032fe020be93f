//! Memoization of backend results per cache key.
//!
//! Entries live for a fixed TTL; the map is capped and sheds its oldest half
//! when it overflows. Overflow is handled entirely by eviction — it is never
//! surfaced to a caller as a failure.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use courier_common::types::AggregationResult;

/// How long a memoized result stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Map size cap; crossing it evicts the oldest half by timestamp.
pub const MAX_ENTRIES: usize = 1000;

/// Queries longer than this are never cached.
pub const MAX_CACHED_QUERY_CHARS: usize = 200;

/// Composite cache key: query, user, backend mode, conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key, or `None` when the query is over the caching cap.
    #[must_use]
    pub fn build(query: &str, user: &str, mode: &str, conversation_id: &str) -> Option<Self> {
        if query.chars().count() > MAX_CACHED_QUERY_CHARS {
            return None;
        }
        Some(Self(format!("{query}|{user}|{mode}|{conversation_id}")))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Option<AggregationResult>,
    error: Option<String>,
    created_at: Instant,
}

/// Process-wide response cache.
#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a memoized outcome, honoring the TTL.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<(Option<AggregationResult>, Option<String>)> {
        self.get_at(key, Instant::now())
    }

    fn get_at(
        &self,
        key: &CacheKey,
        now: Instant,
    ) -> Option<(Option<AggregationResult>, Option<String>)> {
        let entry = self.entries.get(key)?;
        if now.duration_since(entry.created_at) >= CACHE_TTL {
            return None;
        }
        Some((entry.result.clone(), entry.error.clone()))
    }

    /// Write or refresh an entry, then sweep expired/overflowing entries.
    pub fn insert(&self, key: CacheKey, result: AggregationResult) {
        self.insert_at(key, result, Instant::now());
    }

    fn insert_at(&self, key: CacheKey, result: AggregationResult, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                result: Some(result),
                error: None,
                created_at: now,
            },
        );
        self.sweep(now);
    }

    /// Drop expired entries; when still over cap, drop the oldest half.
    fn sweep(&self, now: Instant) {
        self.entries
            .retain(|_, entry| now.duration_since(entry.created_at) < CACHE_TTL);

        if self.entries.len() <= MAX_ENTRIES {
            return;
        }

        let mut by_age: Vec<(CacheKey, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().created_at))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);
        for (key, _) in by_age.into_iter().take(self.entries.len() / 2) {
            self.entries.remove(&key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
