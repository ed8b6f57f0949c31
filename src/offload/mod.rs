//! Offload layer - async bridge to a background execution context
//!
//! - `protocol` - Closed task/output enums and correlation-tagged messages
//! - `worker` - `WorkerSpawner` trait and the default OS-thread worker
//! - `channel` - `OffloadChannel`: pending map, timeouts, crash recovery

pub mod channel;
pub mod protocol;
pub mod worker;

pub use channel::{OffloadChannel, OffloadConfig, DEFAULT_OFFLOAD_TIMEOUT, DEFAULT_REINIT_BACKOFF};
pub use protocol::{AnalysisTask, OffloadRequest, OffloadResponse, Outcome, RequestId, TaskOutput};
pub use worker::{ThreadWorkerSpawner, WorkerEvent, WorkerLink, WorkerSpawner};
