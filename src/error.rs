//! Error types shared across the engine
//!
//! Cache misses and an unavailable worker are not errors; they are normal
//! branches handled where they occur. The types here cover what can actually
//! fail: offloaded requests, analysis input, and configuration.

use crate::offload::RequestId;

/// Failure of a single offloaded request
#[derive(Debug, Clone, PartialEq)]
pub enum OffloadError {
    /// No live background context; callers fall back to local execution
    Unavailable,
    /// No response arrived before the deadline
    Timeout { id: RequestId, timeout_ms: u64 },
    /// The background context crashed while the request was pending
    Crashed(String),
    /// The worker handled the request and reported a failure
    Failed(String),
    /// The background context could not be started
    Spawn(String),
    /// The channel was shut down while the request was pending
    Disconnected,
}

impl std::fmt::Display for OffloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffloadError::Unavailable => write!(f, "Offload worker unavailable"),
            OffloadError::Timeout { id, timeout_ms } => {
                write!(f, "Offload request {} timed out after {}ms", id, timeout_ms)
            }
            OffloadError::Crashed(msg) => write!(f, "Offload worker crashed: {}", msg),
            OffloadError::Failed(msg) => write!(f, "Offload task failed: {}", msg),
            OffloadError::Spawn(msg) => write!(f, "Failed to start offload worker: {}", msg),
            OffloadError::Disconnected => write!(f, "Offload channel disconnected"),
        }
    }
}

impl std::error::Error for OffloadError {}

/// Failure of an analysis computation
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    InvalidInput(String),
    InsufficientData { required: usize, actual: usize },
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::InvalidInput(msg) => write!(f, "Invalid analysis input: {}", msg),
            AnalysisError::InsufficientData { required, actual } => write!(
                f,
                "Insufficient data: need at least {} points, got {}",
                required, actual
            ),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Error surfaced by `SchedulingEngine::execute`
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Offload(OffloadError),
    Analysis(AnalysisError),
    /// A batch task panicked or was cancelled
    Task(String),
}

impl From<OffloadError> for EngineError {
    fn from(err: OffloadError) -> Self {
        EngineError::Offload(err)
    }
}

impl From<AnalysisError> for EngineError {
    fn from(err: AnalysisError) -> Self {
        EngineError::Analysis(err)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Offload(e) => write!(f, "Offload error: {}", e),
            EngineError::Analysis(e) => write!(f, "Analysis error: {}", e),
            EngineError::Task(msg) => write!(f, "Task error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
