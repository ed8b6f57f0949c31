//! Correlation-tracked request/response bridge to a background worker
//!
//! ```text
//! send(task) ──► pending[id] = responder ──► WorkerLink.requests
//!                                                   │
//! listener ◄── WorkerLink.events ◄──────────────────┘
//!    ├─ Response(id)  → remove pending[id], resolve
//!    └─ Crashed / EOF → reject all pending, respawn once after backoff
//! ```
//!
//! Each request ends exactly once: resolved, rejected by the worker, rejected
//! by timeout, or rejected by a crash. Late responses for requests that
//! already ended are dropped.

use super::protocol::{AnalysisTask, OffloadRequest, OffloadResponse, Outcome, RequestId, TaskOutput};
use super::worker::{WorkerEvent, WorkerSpawner};
use crate::error::OffloadError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default per-request timeout
pub const DEFAULT_OFFLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before the single respawn attempt after a crash
pub const DEFAULT_REINIT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct OffloadConfig {
    pub timeout: Duration,
    pub reinit_backoff: Duration,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OFFLOAD_TIMEOUT,
            reinit_backoff: DEFAULT_REINIT_BACKOFF,
        }
    }
}

type Responder = oneshot::Sender<Result<TaskOutput, OffloadError>>;

struct PendingRequest {
    kind: &'static str,
    responder: Responder,
    sent_at: Instant,
}

struct ActiveWorker {
    /// Incremented per spawn; stale listeners compare against it
    generation: u64,
    requests: mpsc::UnboundedSender<OffloadRequest>,
    listener: JoinHandle<()>,
}

struct ChannelShared {
    spawner: Arc<dyn WorkerSpawner>,
    config: OffloadConfig,
    // Lock order: worker before pending
    worker: Mutex<Option<ActiveWorker>>,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    next_id: AtomicU64,
    generation: AtomicU64,
    /// Set by `shutdown`; blocks any later (re)spawn
    shut_down: AtomicBool,
}

/// Removes a request from the pending map when `send` ends for any reason,
/// including the caller dropping the future
struct PendingGuard<'a> {
    shared: &'a ChannelShared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.shared.pending.lock().unwrap().remove(&self.id).is_some() {
            log::debug!("Request {} abandoned by caller", self.id);
        }
    }
}

/// Handle to the offload channel
///
/// Cheap to clone; all clones share one worker and one pending map. The
/// worker is released when the last handle is dropped or on `shutdown`.
#[derive(Clone)]
pub struct OffloadChannel {
    shared: Arc<ChannelShared>,
}

impl OffloadChannel {
    /// Create the channel and spawn its first worker
    ///
    /// A failed spawn is logged and leaves the channel unavailable; callers
    /// see that through `is_available` and run locally.
    pub async fn start(spawner: Arc<dyn WorkerSpawner>, config: OffloadConfig) -> Self {
        let shared = Arc::new(ChannelShared {
            spawner,
            config,
            worker: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        });

        if let Err(e) = initialize(&shared).await {
            log::warn!("⚠️  Offload worker unavailable, running locally: {}", e);
        }

        Self { shared }
    }

    /// Dispatch `task` to the worker and await its result
    ///
    /// Fails fast with `Unavailable` when no worker is live. Otherwise the
    /// request resolves with the worker's output, or is rejected by the
    /// worker, by the configured timeout, or by a crash.
    pub async fn send(&self, task: AnalysisTask) -> Result<TaskOutput, OffloadError> {
        let id = RequestId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let kind = task.kind();
        let (responder, mut receiver) = oneshot::channel();
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        {
            let worker = self.shared.worker.lock().unwrap();
            let active = worker.as_ref().ok_or(OffloadError::Unavailable)?;

            self.shared.pending.lock().unwrap().insert(
                id,
                PendingRequest {
                    kind,
                    responder,
                    sent_at: Instant::now(),
                },
            );

            if active.requests.send(OffloadRequest { id, task }).is_err() {
                return Err(OffloadError::Crashed(
                    "worker stopped accepting requests".to_string(),
                ));
            }
        }

        log::debug!("📤 Offloaded {} {}", kind, id);

        let timeout = self.shared.config.timeout;
        match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OffloadError::Disconnected),
            Err(_) => {
                let expired = self.shared.pending.lock().unwrap().remove(&id);
                if expired.is_some() {
                    log::warn!("⏳ Offload {} {} timed out after {}ms", kind, id, timeout.as_millis());
                    return Err(OffloadError::Timeout {
                        id,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                // Completed between the deadline and the removal
                match receiver.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(OffloadError::Disconnected),
                }
            }
        }
    }

    /// Whether a live worker currently exists
    pub fn is_available(&self) -> bool {
        self.shared.worker.lock().unwrap().is_some()
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }

    pub fn config(&self) -> &OffloadConfig {
        &self.shared.config
    }

    /// Stop the worker and reject everything pending with `Disconnected`
    ///
    /// No respawn follows a shutdown.
    pub fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::SeqCst);
        let worker = self.shared.worker.lock().unwrap().take();
        if let Some(active) = worker {
            active.listener.abort();
            log::info!("🛑 Offload worker (generation {}) shut down", active.generation);
        }

        let drained: Vec<PendingRequest> = {
            let mut pending = self.shared.pending.lock().unwrap();
            pending.drain().map(|(_, request)| request).collect()
        };
        for request in drained {
            let _ = request.responder.send(Err(OffloadError::Disconnected));
        }
    }
}

/// Spawn a worker and start listening to its events
async fn initialize(shared: &Arc<ChannelShared>) -> Result<(), OffloadError> {
    let link = shared.spawner.spawn().await?;
    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

    // Hold the slot while the listener starts so an immediate crash event
    // sees this generation as active
    let previous = {
        let mut worker = shared.worker.lock().unwrap();
        if shared.shut_down.load(Ordering::SeqCst) {
            // Dropping the link stops the fresh worker
            return Err(OffloadError::Unavailable);
        }
        let listener = tokio::spawn(listen(Arc::downgrade(shared), generation, link.events));
        worker.replace(ActiveWorker {
            generation,
            requests: link.requests,
            listener,
        })
    };
    if let Some(previous) = previous {
        previous.listener.abort();
    }

    log::info!(
        "✅ Offload worker ready ({}, generation {})",
        shared.spawner.worker_type(),
        generation
    );
    Ok(())
}

async fn listen(
    shared: Weak<ChannelShared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    loop {
        let event = events.recv().await;
        let Some(strong) = shared.upgrade() else {
            return;
        };

        match event {
            Some(WorkerEvent::Response(response)) => complete(&strong, response),
            Some(WorkerEvent::Crashed(reason)) => {
                handle_crash(&strong, generation, reason);
                return;
            }
            None => {
                handle_crash(&strong, generation, "worker event stream closed".to_string());
                return;
            }
        }
    }
}

fn complete(shared: &ChannelShared, response: OffloadResponse) {
    let Some(request) = shared.pending.lock().unwrap().remove(&response.id) else {
        log::debug!("Dropping orphaned response {}", response.id);
        return;
    };

    let result = match response.outcome {
        Outcome::Success(output) => Ok(output),
        Outcome::Failure(message) => Err(OffloadError::Failed(message)),
    };

    log::debug!(
        "📥 {} {} completed in {}ms",
        request.kind,
        response.id,
        request.sent_at.elapsed().as_millis()
    );

    // Receiver may already be gone if the caller was dropped
    let _ = request.responder.send(result);
}

/// Reject all pending requests and schedule one respawn
///
/// Ignored when `generation` is no longer the active worker (shutdown or an
/// already-handled crash).
fn handle_crash(shared: &Arc<ChannelShared>, generation: u64, reason: String) {
    {
        let mut worker = shared.worker.lock().unwrap();
        match worker.as_ref() {
            Some(active) if active.generation == generation => {
                worker.take();
            }
            _ => return,
        }
    }

    let drained: Vec<PendingRequest> = {
        let mut pending = shared.pending.lock().unwrap();
        pending.drain().map(|(_, request)| request).collect()
    };

    log::error!(
        "❌ Offload worker crashed ({}), rejecting {} pending requests",
        reason,
        drained.len()
    );

    for request in drained {
        let _ = request.responder.send(Err(OffloadError::Crashed(reason.clone())));
    }

    let backoff = shared.config.reinit_backoff;
    let weak = Arc::downgrade(shared);
    tokio::spawn(async move {
        tokio::time::sleep(backoff).await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if shared.shut_down.load(Ordering::SeqCst) {
            log::info!("Channel shut down during backoff, not reinitializing");
            return;
        }
        log::info!("🔄 Reinitializing offload worker after {}ms", backoff.as_millis());
        if let Err(e) = initialize(&shared).await {
            log::error!("❌ Offload worker reinitialization failed: {}", e);
        }
    });
}
