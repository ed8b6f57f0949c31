//! Scheduling layer - decides between cache, offload and local execution
//!
//! - `config` - `EngineConfig` / `SchedulingThresholds` (env-driven)
//! - `decision` - Four-factor additive offload score
//! - `telemetry` - Ring of the last 100 performance samples
//! - `engine` - `SchedulingEngine` orchestration, batch execution and stats

pub mod config;
pub mod decision;
pub mod engine;
pub mod telemetry;

pub use config::{EngineConfig, SchedulingThresholds};
pub use decision::{OffloadScorer, SchedulingDecision, SchedulingFactors, SchedulingSignals};
pub use engine::{BatchOperation, BatchResult, EngineCacheStats, SchedulingEngine};
pub use telemetry::{EngineStats, PerformanceLog, PerformanceSample, StatsReport};
