//! Integration tests for the offload channel
//!
//! A scripted worker hands each spawned link's far ends to the test, which
//! then plays the worker: it reads requests and emits responses or crashes
//! in whatever order the scenario needs.

#[cfg(test)]
mod offload_channel_tests {
    use async_trait::async_trait;
    use finflow::offload::{
        AnalysisTask, OffloadChannel, OffloadConfig, OffloadRequest, OffloadResponse, RequestId,
        TaskOutput, WorkerEvent, WorkerLink, WorkerSpawner,
    };
    use finflow::OffloadError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Worker side of one spawned link
    struct ScriptedWorker {
        requests: mpsc::UnboundedReceiver<OffloadRequest>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    }

    impl ScriptedWorker {
        async fn next_request(&mut self) -> OffloadRequest {
            self.requests.recv().await.expect("channel dropped the link")
        }

        fn respond(&self, request: &OffloadRequest) {
            let response = match request.task.run() {
                Ok(output) => OffloadResponse::success(request.id, output),
                Err(e) => OffloadResponse::failure(request.id, e.to_string()),
            };
            self.events.send(WorkerEvent::Response(response)).unwrap();
        }
    }

    struct ScriptedSpawner {
        workers: mpsc::UnboundedSender<ScriptedWorker>,
        fail: AtomicBool,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl WorkerSpawner for ScriptedSpawner {
        async fn spawn(&self) -> Result<WorkerLink, OffloadError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(OffloadError::Spawn("scripted failure".to_string()));
            }

            let (request_tx, request_rx) = mpsc::unbounded_channel();
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            self.workers
                .send(ScriptedWorker {
                    requests: request_rx,
                    events: event_tx,
                })
                .unwrap();

            Ok(WorkerLink {
                requests: request_tx,
                events: event_rx,
            })
        }

        fn worker_type(&self) -> &'static str {
            "scripted"
        }
    }

    fn scripted(fail: bool) -> (Arc<ScriptedSpawner>, mpsc::UnboundedReceiver<ScriptedWorker>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawner = Arc::new(ScriptedSpawner {
            workers: tx,
            fail: AtomicBool::new(fail),
            attempts: AtomicUsize::new(0),
        });
        (spawner, rx)
    }

    fn config(timeout_ms: u64, backoff_ms: u64) -> OffloadConfig {
        OffloadConfig {
            timeout: Duration::from_millis(timeout_ms),
            reinit_backoff: Duration::from_millis(backoff_ms),
        }
    }

    fn trend(series: &[f64]) -> AnalysisTask {
        AnalysisTask::TrendAnalysis {
            series: series.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner, config(5_000, 100)).await;
        let mut worker = workers.recv().await.unwrap();

        let rising = trend(&[1.0, 2.0, 3.0, 4.0]);
        let falling = trend(&[9.0, 7.0, 5.0, 3.0]);

        let first = tokio::spawn({
            let channel = channel.clone();
            let task = rising.clone();
            async move { channel.send(task).await }
        });
        let second = tokio::spawn({
            let channel = channel.clone();
            let task = falling.clone();
            async move { channel.send(task).await }
        });

        let a = worker.next_request().await;
        let b = worker.next_request().await;
        assert_ne!(a.id, b.id);
        assert_eq!(channel.pending_count(), 2);

        // Answer in reverse arrival order
        worker.respond(&b);
        worker.respond(&a);

        assert_eq!(first.await.unwrap().unwrap(), rising.run().unwrap());
        assert_eq!(second.await.unwrap().unwrap(), falling.run().unwrap());
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_only_the_slow_request() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner, config(50, 100)).await;
        let mut worker = workers.recv().await.unwrap();

        let slow = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(trend(&[1.0, 2.0])).await }
        });
        let fast = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel
                    .send(AnalysisTask::RiskMetrics {
                        series: vec![4.0, -2.0, 3.0],
                    })
                    .await
            }
        });

        let mut slow_request = None;
        for _ in 0..2 {
            let request = worker.next_request().await;
            match request.task {
                AnalysisTask::RiskMetrics { .. } => worker.respond(&request),
                _ => slow_request = Some(request),
            }
        }

        assert!(matches!(fast.await.unwrap(), Ok(TaskOutput::RiskMetrics(_))));

        let slow_request = slow_request.unwrap();
        match slow.await.unwrap() {
            Err(OffloadError::Timeout { id, timeout_ms }) => {
                assert_eq!(id, slow_request.id);
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(channel.pending_count(), 0);

        // Late response for the timed-out request is dropped
        worker.respond(&slow_request);
        tokio::task::yield_now().await;
        assert_eq!(channel.pending_count(), 0);
        assert!(channel.is_available());

        let next = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(trend(&[3.0, 3.0])).await }
        });
        let request = worker.next_request().await;
        worker.respond(&request);
        assert!(next.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_rejects_pending_and_reinitializes_once() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner.clone(), config(5_000, 100)).await;
        let mut worker = workers.recv().await.unwrap();

        let pending: Vec<_> = (0..3)
            .map(|i| {
                let channel = channel.clone();
                tokio::spawn(async move { channel.send(trend(&[i as f64, 1.0])).await })
            })
            .collect();
        for _ in 0..3 {
            worker.next_request().await;
        }
        assert_eq!(channel.pending_count(), 3);

        worker
            .events
            .send(WorkerEvent::Crashed("out of memory".to_string()))
            .unwrap();

        for handle in pending {
            assert_eq!(
                handle.await.unwrap(),
                Err(OffloadError::Crashed("out of memory".to_string()))
            );
        }
        assert_eq!(channel.pending_count(), 0);
        assert!(!channel.is_available());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(spawner.attempts.load(Ordering::SeqCst), 2);
        assert!(channel.is_available());

        let mut replacement = workers.recv().await.unwrap();
        let next = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(trend(&[1.0, 5.0])).await }
        });
        let request = replacement.next_request().await;
        assert!(request.id > RequestId(3));
        replacement.respond(&request);
        assert!(next.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reinit_is_not_retried() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner.clone(), config(5_000, 100)).await;
        let worker = workers.recv().await.unwrap();

        spawner.fail.store(true, Ordering::SeqCst);
        worker
            .events
            .send(WorkerEvent::Crashed("segfault".to_string()))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(spawner.attempts.load(Ordering::SeqCst), 2);
        assert!(!channel.is_available());
        assert_eq!(
            channel.send(trend(&[1.0, 2.0])).await,
            Err(OffloadError::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_closed_event_stream_counts_as_crash() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner, config(5_000, 60_000)).await;
        let mut worker = workers.recv().await.unwrap();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(trend(&[1.0, 2.0])).await }
        });
        worker.next_request().await;
        drop(worker);

        assert!(matches!(
            pending.await.unwrap(),
            Err(OffloadError::Crashed(_))
        ));
        assert!(!channel.is_available());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_channel_unavailable() {
        let (spawner, _workers) = scripted(true);
        let channel = OffloadChannel::start(spawner, config(5_000, 100)).await;

        assert!(!channel.is_available());
        assert_eq!(
            channel.send(trend(&[1.0, 2.0])).await,
            Err(OffloadError::Unavailable)
        );
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_pending_requests() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner, config(5_000, 100)).await;
        let mut worker = workers.recv().await.unwrap();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(trend(&[1.0, 2.0])).await }
        });
        worker.next_request().await;

        channel.shutdown();

        assert_eq!(pending.await.unwrap(), Err(OffloadError::Disconnected));
        assert!(!channel.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_send_releases_pending_entry() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner, config(5_000, 100)).await;
        let mut worker = workers.recv().await.unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), channel.send(trend(&[1.0, 2.0]))).await;
        assert!(abandoned.is_err(), "caller gave up before the worker answered");
        assert_eq!(channel.pending_count(), 0);

        // The worker's late answer is an orphan
        let request = worker.next_request().await;
        worker.respond(&request);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(channel.pending_count(), 0);
        assert!(channel.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_prevents_respawn() {
        let (spawner, mut workers) = scripted(false);
        let channel = OffloadChannel::start(spawner.clone(), config(5_000, 100)).await;
        let mut worker = workers.recv().await.unwrap();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(trend(&[1.0, 2.0])).await }
        });
        worker.next_request().await;
        worker
            .events
            .send(WorkerEvent::Crashed("stack overflow".to_string()))
            .unwrap();
        assert!(matches!(
            pending.await.unwrap(),
            Err(OffloadError::Crashed(_))
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(spawner.attempts.load(Ordering::SeqCst), 1);
        assert!(!channel.is_available());
        assert_eq!(
            channel.send(trend(&[1.0, 2.0])).await,
            Err(OffloadError::Unavailable)
        );
    }
}
