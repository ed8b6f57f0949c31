//! Engine configuration from environment variables

use crate::cache::{ANALYSIS_TTL, DEFAULT_MAX_SIZE, DEFAULT_TTL};
use crate::error::ConfigError;
use crate::offload::{OffloadConfig, DEFAULT_OFFLOAD_TIMEOUT, DEFAULT_REINIT_BACKOFF};
use std::env;
use std::time::Duration;

/// Thresholds and weights of the offload score
///
/// Each factor adds its weight when its condition holds; the total is
/// compared to `offload_score`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingThresholds {
    /// Input size (records) above which offloading pays off
    pub min_input_size: usize,
    /// Pending offload requests below which the worker counts as idle
    pub max_queue_depth: usize,
    /// Estimated memory pressure (0.0-1.0) below which offloading is allowed
    pub max_memory_pressure: f64,
    /// Mean recent calculation time (ms) below which load counts as low
    pub max_recent_load_ms: f64,
    pub size_weight: u32,
    pub queue_weight: u32,
    pub memory_weight: u32,
    pub load_weight: u32,
    /// Minimum score (0-100) to offload
    pub offload_score: u32,
}

impl Default for SchedulingThresholds {
    fn default() -> Self {
        Self {
            min_input_size: 1_000,
            max_queue_depth: 5,
            max_memory_pressure: 0.8,
            max_recent_load_ms: 100.0,
            size_weight: 30,
            queue_weight: 25,
            memory_weight: 25,
            load_weight: 20,
            offload_score: 60,
        }
    }
}

/// Configuration for the scheduling engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// TTL of whole-analysis results
    pub analysis_ttl: Duration,

    /// TTL of memoized task results
    pub default_ttl: Duration,

    /// Capacity of each cache (entries)
    pub cache_capacity: usize,

    /// Offload request timeout
    pub offload_timeout: Duration,

    /// Delay before respawning a crashed worker
    pub reinit_backoff: Duration,

    /// Master switch for the background worker
    pub enable_offload: bool,

    pub thresholds: SchedulingThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis_ttl: ANALYSIS_TTL,
            default_ttl: DEFAULT_TTL,
            cache_capacity: DEFAULT_MAX_SIZE,
            offload_timeout: DEFAULT_OFFLOAD_TIMEOUT,
            reinit_backoff: DEFAULT_REINIT_BACKOFF,
            enable_offload: true,
            thresholds: SchedulingThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `FINFLOW_ANALYSIS_TTL_SECS` (default: 600)
    /// - `FINFLOW_CACHE_TTL_SECS` (default: 300)
    /// - `FINFLOW_CACHE_CAPACITY` (default: 500)
    /// - `FINFLOW_OFFLOAD_TIMEOUT_MS` (default: 30000)
    /// - `FINFLOW_REINIT_BACKOFF_MS` (default: 1000)
    /// - `FINFLOW_ENABLE_OFFLOAD` (default: true)
    /// - `FINFLOW_OFFLOAD_MIN_INPUT` (default: 1000)
    /// - `FINFLOW_OFFLOAD_MAX_QUEUE` (default: 5)
    /// - `FINFLOW_OFFLOAD_MAX_MEMORY` (default: 0.8)
    /// - `FINFLOW_OFFLOAD_MAX_LOAD_MS` (default: 100)
    /// - `FINFLOW_OFFLOAD_SCORE` (default: 60)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let thresholds = SchedulingThresholds::default();

        let parse_secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let parse_millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            analysis_ttl: parse_secs("FINFLOW_ANALYSIS_TTL_SECS", defaults.analysis_ttl),
            default_ttl: parse_secs("FINFLOW_CACHE_TTL_SECS", defaults.default_ttl),
            cache_capacity: lookup("FINFLOW_CACHE_CAPACITY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_capacity),
            offload_timeout: parse_millis("FINFLOW_OFFLOAD_TIMEOUT_MS", defaults.offload_timeout),
            reinit_backoff: parse_millis("FINFLOW_REINIT_BACKOFF_MS", defaults.reinit_backoff),
            enable_offload: lookup("FINFLOW_ENABLE_OFFLOAD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enable_offload),
            thresholds: SchedulingThresholds {
                min_input_size: lookup("FINFLOW_OFFLOAD_MIN_INPUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(thresholds.min_input_size),
                max_queue_depth: lookup("FINFLOW_OFFLOAD_MAX_QUEUE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(thresholds.max_queue_depth),
                max_memory_pressure: lookup("FINFLOW_OFFLOAD_MAX_MEMORY")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(thresholds.max_memory_pressure),
                max_recent_load_ms: lookup("FINFLOW_OFFLOAD_MAX_LOAD_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(thresholds.max_recent_load_ms),
                offload_score: lookup("FINFLOW_OFFLOAD_SCORE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(thresholds.offload_score),
                ..thresholds
            },
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "FINFLOW_CACHE_CAPACITY must be greater than zero".to_string(),
            ));
        }
        if self.offload_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "FINFLOW_OFFLOAD_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        let memory = self.thresholds.max_memory_pressure;
        if !(0.0..=1.0).contains(&memory) {
            return Err(ConfigError::InvalidValue(format!(
                "FINFLOW_OFFLOAD_MAX_MEMORY must be within 0.0-1.0, got {}",
                memory
            )));
        }
        if self.thresholds.offload_score > 100 {
            return Err(ConfigError::InvalidValue(format!(
                "FINFLOW_OFFLOAD_SCORE must be at most 100, got {}",
                self.thresholds.offload_score
            )));
        }
        Ok(())
    }

    pub fn offload_config(&self) -> OffloadConfig {
        OffloadConfig {
            timeout: self.offload_timeout,
            reinit_backoff: self.reinit_backoff,
        }
    }
}
