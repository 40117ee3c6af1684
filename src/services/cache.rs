use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

use crate::models::{Prediction, QualityReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MatchdayPredictions(i32),
    QualitySummary,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::MatchdayPredictions(day) => write!(f, "predictions:matchday:{}", day),
            CacheKey::QualitySummary => f.write_str("quality:summary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Predictions(Vec<Prediction>),
    Quality(QualityReport),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: DateTime<Utc>,
}

/// TTL cache for computed results. Expired entries stay around as stale fallbacks
/// until they are overwritten or invalidated.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CachedValue> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Last stored value regardless of expiry.
    pub fn get_stale(&self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.lock().get(key).map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        self.put_at(key, value, ttl, Utc::now());
    }

    pub fn put_at(&self, key: CacheKey, value: CachedValue, ttl: Duration, now: DateTime<Utc>) {
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
        };
        self.entries.lock().insert(key, entry);
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if self.entries.lock().remove(key).is_some() {
            tracing::debug!("Invalidated cache entry {}", key);
        }
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        tracing::debug!("Cleared {} cache entries", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictions() -> CachedValue {
        CachedValue::Predictions(Vec::new())
    }

    #[test]
    fn keys_render_as_operation_and_parameters() {
        assert_eq!(CacheKey::MatchdayPredictions(7).to_string(), "predictions:matchday:7");
        assert_eq!(CacheKey::QualitySummary.to_string(), "quality:summary");
    }

    #[test]
    fn entries_expire_after_their_ttl() {
        let cache = ResultCache::new();
        let now = Utc::now();
        let key = CacheKey::MatchdayPredictions(7);
        cache.put_at(key, predictions(), Duration::minutes(30), now);

        assert!(cache.get_at(&key, now + Duration::minutes(29)).is_some());
        assert!(cache.get_at(&key, now + Duration::minutes(30)).is_none());
        assert!(cache.get_stale(&key).is_some());
    }

    #[test]
    fn invalidation_is_per_key_or_global() {
        let cache = ResultCache::new();
        cache.put(CacheKey::MatchdayPredictions(1), predictions(), Duration::minutes(30));
        cache.put(CacheKey::MatchdayPredictions(2), predictions(), Duration::minutes(30));
        cache.put(CacheKey::QualitySummary, predictions(), Duration::hours(6));

        cache.invalidate(&CacheKey::MatchdayPredictions(1));
        assert!(cache.get(&CacheKey::MatchdayPredictions(1)).is_none());
        assert!(cache.get_stale(&CacheKey::MatchdayPredictions(1)).is_none());
        assert!(cache.get(&CacheKey::MatchdayPredictions(2)).is_some());

        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
