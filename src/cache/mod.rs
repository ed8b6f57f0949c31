//! Caching layer
//!
//! ```text
//! TtlCache (bounded, expiring store)
//!     ├── Memoized (typed function memoization, keys "memo:{name}:{input}")
//!     └── AnalysisCache (whole-analysis results, keys "analysis:{fingerprint}")
//! ```
//!
//! Caches are process-lifetime only and never persisted.

pub mod fingerprint;
pub mod memo;
pub mod ttl;

pub use fingerprint::{fingerprint, AnalysisCache, ANALYSIS_TTL};
pub use memo::{memoize, MemoizeOptions, Memoized};
pub use ttl::{CacheStats, TtlCache, DEFAULT_MAX_SIZE, DEFAULT_TTL};
