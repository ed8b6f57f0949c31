//! Background execution context
//!
//! A worker is reached only through a `WorkerLink`: a request sender and an
//! event receiver. The default `ThreadWorkerSpawner` runs tasks on one
//! dedicated OS thread; tests substitute scripted workers.

use super::protocol::{OffloadRequest, OffloadResponse};
use crate::error::OffloadError;
use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::mpsc;

/// Event emitted by a background worker
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Response(OffloadResponse),
    /// The worker died; every pending request is lost
    Crashed(String),
}

/// Message-passing handle to a live worker
pub struct WorkerLink {
    pub requests: mpsc::UnboundedSender<OffloadRequest>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Factory for background workers
///
/// Called once when the channel starts and once per crash recovery.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> Result<WorkerLink, OffloadError>;

    /// Name for logging
    fn worker_type(&self) -> &'static str;
}

/// Runs analysis tasks on a dedicated OS thread
///
/// A panicking task is reported as `WorkerEvent::Crashed` and the thread
/// exits; the channel then decides whether to spawn a replacement.
#[derive(Debug, Clone, Default)]
pub struct ThreadWorkerSpawner;

#[async_trait]
impl WorkerSpawner for ThreadWorkerSpawner {
    async fn spawn(&self) -> Result<WorkerLink, OffloadError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("finflow-worker".to_string())
            .spawn(move || worker_loop(request_rx, event_tx))
            .map_err(|e| OffloadError::Spawn(e.to_string()))?;

        log::info!("🧵 Offload worker thread started");

        Ok(WorkerLink {
            requests: request_tx,
            events: event_rx,
        })
    }

    fn worker_type(&self) -> &'static str {
        "thread"
    }
}

fn worker_loop(
    mut requests: mpsc::UnboundedReceiver<OffloadRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    while let Some(request) = requests.blocking_recv() {
        let id = request.id;
        let kind = request.task.kind();

        let result = panic::catch_unwind(AssertUnwindSafe(|| request.task.run()));

        let event = match result {
            Ok(Ok(output)) => WorkerEvent::Response(OffloadResponse::success(id, output)),
            Ok(Err(e)) => WorkerEvent::Response(OffloadResponse::failure(id, e.to_string())),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("❌ Worker panicked on {} {}: {}", kind, id, message);
                let _ = events.send(WorkerEvent::Crashed(format!("{} panicked: {}", kind, message)));
                return;
            }
        };

        if events.send(event).is_err() {
            // Channel side dropped the link
            break;
        }
    }

    log::debug!("Offload worker thread exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offload::protocol::{AnalysisTask, Outcome, RequestId, TaskOutput};

    #[tokio::test]
    async fn test_thread_worker_round_trip() {
        let mut link = ThreadWorkerSpawner.spawn().await.unwrap();

        link.requests
            .send(OffloadRequest {
                id: RequestId(7),
                task: AnalysisTask::TrendAnalysis {
                    series: vec![1.0, 2.0, 3.0],
                },
            })
            .unwrap();

        match link.events.recv().await {
            Some(WorkerEvent::Response(response)) => {
                assert_eq!(response.id, RequestId(7));
                assert!(matches!(
                    response.outcome,
                    Outcome::Success(TaskOutput::TrendAnalysis(_))
                ));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_thread_worker_reports_task_failure() {
        let mut link = ThreadWorkerSpawner.spawn().await.unwrap();

        link.requests
            .send(OffloadRequest {
                id: RequestId(1),
                task: AnalysisTask::RiskMetrics { series: vec![] },
            })
            .unwrap();

        match link.events.recv().await {
            Some(WorkerEvent::Response(response)) => {
                assert!(matches!(response.outcome, Outcome::Failure(_)));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_thread_worker_stops_when_link_dropped() {
        let link = ThreadWorkerSpawner.spawn().await.unwrap();
        let WorkerLink { requests, mut events } = link;
        drop(requests);

        assert!(events.recv().await.is_none());
    }
}
