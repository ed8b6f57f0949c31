//! Bounded key/value store with per-entry expiry
//!
//! Expired entries are treated as absent and removed lazily on access. When
//! an insert would exceed capacity, expired entries are purged first and then
//! the entry with the lowest access count is evicted (oldest insert wins ties).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Default TTL for entries inserted without an explicit one (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default capacity
pub const DEFAULT_MAX_SIZE: usize = 500;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    created_at: i64,
    ttl_ms: i64,
    access_count: u64,
    /// Insertion sequence, breaks eviction ties
    seq: u64,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: i64) -> bool {
        now - self.created_at >= self.ttl_ms
    }
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

/// Snapshot of cache occupancy and hit rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 before the first lookup
    pub hit_rate: f64,
}

/// Expiring, capacity-bounded cache
///
/// All methods take `&self`; the state sits behind a mutex so a cache can be
/// shared through an `Arc` between the engine and its memoized functions.
pub struct TtlCache<T> {
    state: Mutex<CacheState<T>>,
    max_size: usize,
    default_ttl: Duration,
    /// Clock returning epoch milliseconds (mockable in tests)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl<T: Clone> TtlCache<T> {
    /// Create a cache using the system clock
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self::with_clock(
            max_size,
            default_ttl,
            Box::new(|| chrono::Utc::now().timestamp_millis()),
        )
    }

    /// Create a cache with a custom clock
    ///
    /// # Arguments
    /// * `now_fn` - Function returning epoch milliseconds
    pub fn with_clock(
        max_size: usize,
        default_ttl: Duration,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
            }),
            max_size,
            default_ttl,
            now_fn,
        }
    }

    /// Insert or overwrite `key`
    ///
    /// Overwriting resets the entry's age and access count.
    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        if self.max_size == 0 {
            return;
        }

        let now = (self.now_fn)();
        let mut state = self.state.lock().unwrap();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_size {
            state.entries.retain(|_, entry| !entry.is_expired(now));
            if state.entries.len() >= self.max_size {
                evict_least_used(&mut state.entries);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                created_at: now,
                ttl_ms: ttl.as_millis().min(i64::MAX as u128) as i64,
                access_count: 0,
                seq,
            },
        );
    }

    /// Insert with the cache's default TTL
    pub fn set_default(&self, key: &str, value: T) {
        self.set(key, value, self.default_ttl);
    }

    /// Look up `key`, counting the hit or miss
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = (self.now_fn)();
        let mut state = self.state.lock().unwrap();

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.access_count += 1;
        Some(entry.data.clone())
    }

    /// Non-mutating presence check (no counters, no removal)
    pub fn has(&self, key: &str) -> bool {
        let now = (self.now_fn)();
        let state = self.state.lock().unwrap();
        state
            .entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().unwrap().entries.remove(key).is_some()
    }

    /// Drop every entry and reset hit/miss counters
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Delete every key matching `pattern`, returning how many were removed
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.entries.len();
        state.entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - state.entries.len();
        if removed > 0 {
            log::debug!("🧹 Invalidated {} cache entries matching {}", removed, pattern);
        }
        removed
    }

    /// Remove all expired entries
    pub fn purge_expired(&self) -> usize {
        let now = (self.now_fn)();
        let mut state = self.state.lock().unwrap();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        before - state.entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let lookups = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }
}

/// Evict the entry with the lowest access count (earliest insert on ties)
fn evict_least_used<T>(entries: &mut HashMap<String, CacheEntry<T>>) {
    let victim = entries
        .iter()
        .min_by_key(|(_, entry)| (entry.access_count, entry.seq))
        .map(|(key, _)| key.clone());

    if let Some(key) = victim {
        log::debug!("Evicting least used cache entry: {}", key);
        entries.remove(&key);
    }
}
