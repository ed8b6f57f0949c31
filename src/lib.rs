//! FinFlow - adaptive computation and caching engine for personal-finance analysis
//!
//! ```text
//! caller ──► SchedulingEngine
//!               ├── AnalysisCache / Memoized ──► TtlCache
//!               ├── OffloadScorer (size, queue, memory, load)
//!               ├── OffloadChannel ──► background worker (WorkerSpawner)
//!               └── local path: analysis::complex_analysis → basic_analysis
//! ```
//!
//! Numerical building blocks live in `stats`; every analysis result is a
//! pure function of its input, so any layer may cache it.

pub mod analysis;
pub mod cache;
pub mod error;
pub mod offload;
pub mod scheduler;
pub mod stats;

pub use analysis::{AnalysisOutcome, FinancialAnalysis, Goal, Transaction, TransactionType};
pub use error::{AnalysisError, ConfigError, EngineError, OffloadError};
pub use offload::{AnalysisTask, OffloadChannel, TaskOutput};
pub use scheduler::{BatchOperation, BatchResult, EngineConfig, SchedulingEngine, StatsReport};
