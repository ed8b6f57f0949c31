//! Cache-backed memoization for deterministic functions
//!
//! A `Memoized` wraps a function together with a key generator and a
//! caching predicate. Keys are namespaced `memo:{name}:{key}` so a single
//! function's entries can be dropped with a pattern.

use super::ttl::TtlCache;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub type KeyGenerator<I> = Box<dyn Fn(&I) -> Option<String> + Send + Sync>;
pub type CachePredicate<I> = Box<dyn Fn(&I) -> bool + Send + Sync>;

/// Options for `memoize`
///
/// Unset fields fall back to: the cache's default TTL, a JSON serialization
/// of the input as key, and caching every call.
///
/// JSON writes NaN and infinities as `null`, so inputs that differ only in
/// non-finite floats share a default key. Functions taking floats that may be
/// non-finite should supply a `key_generator` that returns `None` for them.
pub struct MemoizeOptions<I> {
    pub ttl: Option<Duration>,
    pub key_generator: Option<KeyGenerator<I>>,
    pub should_cache: Option<CachePredicate<I>>,
}

impl<I> Default for MemoizeOptions<I> {
    fn default() -> Self {
        Self {
            ttl: None,
            key_generator: None,
            should_cache: None,
        }
    }
}

/// A function whose results are cached by input
pub struct Memoized<I, O> {
    name: String,
    func: Box<dyn Fn(&I) -> O + Send + Sync>,
    cache: Arc<TtlCache<O>>,
    ttl: Duration,
    key_generator: KeyGenerator<I>,
    should_cache: CachePredicate<I>,
}

/// Wrap `func` with cache-backed memoization
///
/// # Arguments
/// * `name` - Function identity, used as the key namespace
/// * `cache` - Shared cache holding results
/// * `func` - Deterministic function to memoize
/// * `options` - TTL, key generator and caching predicate overrides
pub fn memoize<I, O, F>(
    name: &str,
    cache: Arc<TtlCache<O>>,
    func: F,
    options: MemoizeOptions<I>,
) -> Memoized<I, O>
where
    I: Serialize + 'static,
    O: Clone + 'static,
    F: Fn(&I) -> O + Send + Sync + 'static,
{
    let ttl = options.ttl.unwrap_or_else(|| cache.default_ttl());
    let key_generator: KeyGenerator<I> = match options.key_generator {
        Some(generator) => generator,
        None => Box::new(|input: &I| serde_json::to_string(input).ok()),
    };
    let should_cache: CachePredicate<I> = match options.should_cache {
        Some(predicate) => predicate,
        None => Box::new(|_: &I| true),
    };

    Memoized {
        name: name.to_string(),
        func: Box::new(func),
        cache,
        ttl,
        key_generator,
        should_cache,
    }
}

impl<I, O: Clone> Memoized<I, O> {
    /// Return the cached result for `input`, computing and storing it on a miss
    ///
    /// When the predicate rejects the input, or no key can be generated, the
    /// cache is bypassed entirely (no read, no write).
    pub fn call(&self, input: &I) -> O {
        let Some(key) = self.key_for(input) else {
            return (self.func)(input);
        };

        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let result = (self.func)(input);
        self.cache.set(&key, result.clone(), self.ttl);
        result
    }

    /// Record a result computed elsewhere (e.g. by a background worker)
    ///
    /// Follows the same predicate and key rules as `call`. Returns whether
    /// the result was stored.
    pub fn store(&self, input: &I, output: O) -> bool {
        match self.key_for(input) {
            Some(key) => {
                self.cache.set(&key, output, self.ttl);
                true
            }
            None => false,
        }
    }

    /// Whether a live cached result exists for `input` (no counters touched)
    pub fn is_cached(&self, input: &I) -> bool {
        match self.key_for(input) {
            Some(key) => self.cache.has(&key),
            None => false,
        }
    }

    fn key_for(&self, input: &I) -> Option<String> {
        if !(self.should_cache)(input) {
            return None;
        }
        match (self.key_generator)(input) {
            Some(key) => Some(format!("memo:{}:{}", self.name, key)),
            None => {
                log::debug!("No memo key for {}, bypassing cache", self.name);
                None
            }
        }
    }

    /// Drop every cached result of this function
    pub fn invalidate(&self) -> usize {
        match Regex::new(&format!("^memo:{}:", regex::escape(&self.name))) {
            Ok(pattern) => self.cache.invalidate_pattern(&pattern),
            Err(e) => {
                log::warn!("⚠️  Could not build invalidation pattern for {}: {}", self.name, e);
                0
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
