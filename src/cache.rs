// =============================================================================
// TTL cache — time-to-live in-memory map for the exchange adapter
// =============================================================================
//
// Generalizes the ring-buffer locking idiom of `market_data::candle_buffer`
// (`RwLock<HashMap<K, V>>`) from pure capacity eviction to timed expiry: every
// entry carries the instant it was set and its own TTL, and a read lazily
// evicts an expired entry instead of returning it.
//
// The cache itself is domain-blind: callers compose a `CacheKey` from
// `(resource, symbol, timeframe, limit)` and the cache only ever sees its
// `Display` string.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

/// Composite key for a cached resource. Not interpreted by the cache itself;
/// only used by callers to build a stable string key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource: String,
    pub symbol: String,
    pub timeframe: String,
    pub limit: usize,
}

impl CacheKey {
    pub fn new(resource: &str, symbol: &str, timeframe: &str, limit: usize) -> Self {
        Self {
            resource: resource.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            limit,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.resource, self.symbol, self.timeframe, self.limit
        )
    }
}

struct Entry {
    value: Value,
    set_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.set_at) >= self.ttl
    }
}

/// Concurrency-safe TTL map. `Get` returns `None` for a never-set or expired
/// key, lazily removing an expired entry on read. All operations are pure
/// memory mutations; there is no backing store and no failure mode beyond a
/// rejected `ttl <= 0`.
pub struct TtlCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `value` under `key` with the given TTL. `ttl <= 0` is rejected
    /// (a no-op, matching the cache's "pure memory mutation, no failure"
    /// contract — callers that need to observe this hold `ttl` fixed at the
    /// config layer rather than at this boundary).
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value,
                set_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Fetch a value, evicting it first if its TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let read = self.entries.read();
            if let Some(entry) = read.get(key) {
                if !entry.is_expired(now) {
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        // Expired: drop it under a write lock, then report absent.
        self.entries.write().remove(key);
        None
    }

    /// Remove a key unconditionally, returning its value if present and not
    /// expired.
    pub fn pop(&self, key: &str) -> Option<Value> {
        let mut write = self.entries.write();
        let entry = write.remove(key)?;
        if entry.is_expired(Instant::now()) {
            None
        } else {
            Some(entry.value)
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-resource default TTLs named by the exchange adapter.
pub mod ttl {
    use std::time::Duration;

    pub const MARKETS: Duration = Duration::from_secs(3600);
    pub const TICKERS: Duration = Duration::from_secs(30);
    pub const OHLCV: Duration = Duration::from_secs(60);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn set_then_get_returns_value() {
        let cache = TtlCache::new();
        cache.set("k", serde_json::json!(42), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(serde_json::json!(42)));
    }

    #[test]
    fn missing_key_is_absent() {
        let cache = TtlCache::new();
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entry_is_lazily_evicted() {
        let cache = TtlCache::new();
        cache.set("k", serde_json::json!(1), Duration::from_millis(5));
        sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let cache = TtlCache::new();
        cache.set("k", serde_json::json!(1), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn pop_removes_and_returns() {
        let cache = TtlCache::new();
        cache.set("k", serde_json::json!("v"), Duration::from_secs(60));
        assert_eq!(cache.pop("k"), Some(serde_json::json!("v")));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn clear_empties_all_entries() {
        let cache = TtlCache::new();
        cache.set("a", serde_json::json!(1), Duration::from_secs(60));
        cache.set("b", serde_json::json!(2), Duration::from_secs(60));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_key_display_is_stable() {
        let key = CacheKey::new("ohlcv", "BTC/USDT", "15m", 200);
        assert_eq!(key.to_string(), "ohlcv:BTC/USDT:15m:200");
    }
}
