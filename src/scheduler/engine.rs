//! Scheduling engine - cache, offload or local execution per request
//!
//! ```text
//! run_analysis(transactions, goals, balance)
//!     ↓
//! fingerprint → AnalysisCache hit? ──yes──► return (from_cache)
//!     ↓ no
//! OffloadScorer::decide(size, queue, memory, load)
//!     ├─ offload → OffloadChannel::send ──error──┐
//!     └─ local ◄─────────────────────────────────┘
//!           complex_analysis ──error──► basic_analysis (error field set)
//!     ↓
//! AnalysisCache::set + PerformanceLog::record
//! ```
//!
//! `run_analysis` always produces a usable result: offload failures fall
//! back to local execution and local failures fall back to the basic path.

use super::config::EngineConfig;
use super::decision::{OffloadScorer, SchedulingDecision, SchedulingSignals};
use super::telemetry::{PerformanceLog, PerformanceSample, StatsReport};
use crate::analysis::{
    basic_analysis, complex_analysis, AnalysisOutcome, AnalysisSnapshot, FinancialAnalysis, Goal,
    Transaction,
};
use crate::cache::{fingerprint, memoize, AnalysisCache, CacheStats, MemoizeOptions, Memoized, TtlCache};
use crate::error::{AnalysisError, EngineError, OffloadError};
use crate::offload::{AnalysisTask, OffloadChannel, TaskOutput, ThreadWorkerSpawner};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;

type TaskResult = Result<TaskOutput, AnalysisError>;

/// A named operation for `run_batch`
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub name: String,
    pub task: AnalysisTask,
}

impl BatchOperation {
    pub fn new(name: impl Into<String>, task: AnalysisTask) -> Self {
        Self {
            name: name.into(),
            task,
        }
    }
}

/// Settled result of one batch operation
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub name: String,
    pub result: Result<TaskOutput, EngineError>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineCacheStats {
    pub analysis: CacheStats,
    pub tasks: CacheStats,
}

pub struct SchedulingEngine {
    config: EngineConfig,
    analysis_cache: AnalysisCache,
    task_cache: Arc<TtlCache<TaskResult>>,
    /// Local trend/risk/projection computations
    task_memo: Memoized<AnalysisTask, TaskResult>,
    scorer: OffloadScorer,
    channel: Option<OffloadChannel>,
    samples: Mutex<PerformanceLog>,
    /// Memory pressure estimate override (0.0-1.0)
    memory_probe: Option<Box<dyn Fn() -> f64 + Send + Sync>>,
}

impl SchedulingEngine {
    /// Create an engine with fresh caches
    ///
    /// Without a channel every request runs locally.
    pub fn new(config: EngineConfig, channel: Option<OffloadChannel>) -> Self {
        let analysis_store = Arc::new(TtlCache::new(config.cache_capacity, config.analysis_ttl));
        let task_cache = Arc::new(TtlCache::new(config.cache_capacity, config.default_ttl));

        let task_memo = memoize(
            "analysis_task",
            task_cache.clone(),
            |task: &AnalysisTask| task.run(),
            MemoizeOptions {
                // NaN and infinities serialize alike
                key_generator: Some(Box::new(|task: &AnalysisTask| {
                    if task.is_finite() {
                        serde_json::to_string(task).ok()
                    } else {
                        None
                    }
                })),
                // Whole analyses are cached by fingerprint instead
                should_cache: Some(Box::new(|task: &AnalysisTask| {
                    !matches!(task, AnalysisTask::ComplexAnalysis(_))
                })),
                ..Default::default()
            },
        );

        Self {
            analysis_cache: AnalysisCache::new(analysis_store, config.analysis_ttl),
            task_cache,
            task_memo,
            scorer: OffloadScorer::new(config.thresholds.clone()),
            channel,
            samples: Mutex::new(PerformanceLog::new()),
            memory_probe: None,
            config,
        }
    }

    /// Create an engine backed by the OS-thread worker
    ///
    /// The worker is skipped when `enable_offload` is false.
    pub async fn with_thread_worker(config: EngineConfig) -> Self {
        let channel = if config.enable_offload {
            Some(OffloadChannel::start(Arc::new(ThreadWorkerSpawner), config.offload_config()).await)
        } else {
            log::info!("Offload disabled, all analysis runs locally");
            None
        };
        Self::new(config, channel)
    }

    /// Replace the cache-occupancy memory estimate
    pub fn with_memory_probe(mut self, probe: Box<dyn Fn() -> f64 + Send + Sync>) -> Self {
        self.memory_probe = Some(probe);
        self
    }

    /// Score whether work of `input_size` records should be offloaded now
    pub fn scheduling_decision(&self, input_size: usize) -> SchedulingDecision {
        let signals = SchedulingSignals {
            input_size,
            queue_depth: self.channel.as_ref().map(|c| c.pending_count()).unwrap_or(0),
            memory_pressure: self.memory_pressure(),
            recent_load_ms: self.samples.lock().unwrap().recent_load_ms(),
        };
        let available = self.channel.as_ref().map(|c| c.is_available()).unwrap_or(false);
        self.scorer.decide(signals, available)
    }

    /// Analyse a snapshot, answering from cache when possible
    pub async fn run_analysis(
        &self,
        transactions: &[Transaction],
        goals: &[Goal],
        balance: f64,
    ) -> AnalysisOutcome {
        let started = Instant::now();
        let input_size = transactions.len() + goals.len();
        let fp = fingerprint(transactions, goals, balance);

        if let Some(analysis) = self.analysis_cache.get_cached_analysis(&fp) {
            let elapsed = elapsed_ms(started);
            self.record(elapsed, true, false, input_size);
            log::debug!("⚡ Analysis cache hit ({} records)", input_size);
            return AnalysisOutcome {
                analysis,
                from_cache: true,
                used_offload: false,
                calculation_time_ms: elapsed,
            };
        }

        let snapshot = AnalysisSnapshot::new(transactions, goals, balance);
        let decision = self.scheduling_decision(input_size);
        log::debug!(
            "Scheduling {} records: score {} (offload: {})",
            input_size,
            decision.score,
            decision.offload
        );

        let offloaded = if decision.offload {
            self.offload_analysis(&snapshot).await
        } else {
            None
        };
        let used_offload = offloaded.is_some();
        let analysis = match offloaded {
            Some(analysis) => analysis,
            None => self.compute_locally(&snapshot).await,
        };

        self.analysis_cache.set_cached_analysis(&fp, analysis.clone());

        let elapsed = elapsed_ms(started);
        self.record(elapsed, false, used_offload, input_size);

        AnalysisOutcome {
            analysis,
            from_cache: false,
            used_offload,
            calculation_time_ms: elapsed,
        }
    }

    /// Run one task, offloading or computing locally
    ///
    /// Timeouts, crashes and an unavailable worker fall back to local
    /// execution. A failure reported by the worker itself is returned as is,
    /// since the local computation would fail the same way.
    pub async fn execute(&self, task: AnalysisTask) -> Result<TaskOutput, EngineError> {
        if let AnalysisTask::ComplexAnalysis(snapshot) = &task {
            let outcome = self
                .run_analysis(&snapshot.transactions, &snapshot.goals, snapshot.balance)
                .await;
            return Ok(TaskOutput::ComplexAnalysis(outcome.analysis));
        }

        let started = Instant::now();
        let input_size = task.input_size();

        if self.task_memo.is_cached(&task) {
            let result = self.task_memo.call(&task);
            self.record(elapsed_ms(started), true, false, input_size);
            return result.map_err(EngineError::from);
        }

        let decision = self.scheduling_decision(input_size);
        if decision.offload {
            if let Some(channel) = &self.channel {
                match channel.send(task.clone()).await {
                    Ok(output) => {
                        self.task_memo.store(&task, Ok(output.clone()));
                        self.record(elapsed_ms(started), false, true, input_size);
                        return Ok(output);
                    }
                    Err(OffloadError::Failed(message)) => {
                        self.record(elapsed_ms(started), false, true, input_size);
                        return Err(EngineError::Offload(OffloadError::Failed(message)));
                    }
                    Err(e) => {
                        log::warn!("⚠️  Offload of {} failed, running locally: {}", task.kind(), e);
                    }
                }
            }
        }

        tokio::task::yield_now().await;
        let result = self.task_memo.call(&task);
        self.record(elapsed_ms(started), false, false, input_size);
        result.map_err(EngineError::from)
    }

    /// Run named operations concurrently and settle every one of them
    ///
    /// Results come back in input order; one failure never aborts the rest.
    pub async fn run_batch(self: &Arc<Self>, operations: Vec<BatchOperation>) -> Vec<BatchResult> {
        let total = operations.len();
        let handles: Vec<_> = operations
            .into_iter()
            .map(|BatchOperation { name, task }| {
                let engine = Arc::clone(self);
                let handle = tokio::spawn(async move { engine.execute(task).await });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::Task(e.to_string())),
            };
            if let Err(e) = &result {
                log::warn!("⚠️  Batch operation {} failed: {}", name, e);
            }
            results.push(BatchResult { name, result });
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        log::info!("📦 Batch complete: {}/{} operations succeeded", succeeded, total);
        results
    }

    /// Averages over the last 100 requests
    pub fn get_stats(&self) -> StatsReport {
        self.samples.lock().unwrap().report()
    }

    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            analysis: self.analysis_cache.inner().stats(),
            tasks: self.task_cache.stats(),
        }
    }

    /// Drop every cached analysis and memoized task result
    ///
    /// For callers that changed transactions in place, where the fingerprint
    /// cannot see the edit.
    pub fn invalidate_transactions(&self) -> usize {
        let removed = self.analysis_cache.invalidate_all() + self.task_memo.invalidate();
        log::info!("🧹 Invalidated {} cached results after transaction change", removed);
        removed
    }

    /// Clear all caches and samples (explicit reset, e.g. on logout)
    pub fn cleanup(&self) {
        self.analysis_cache.inner().clear();
        self.task_cache.clear();
        self.samples.lock().unwrap().clear();
        log::info!("🧹 Scheduling engine reset");
    }

    pub fn channel(&self) -> Option<&OffloadChannel> {
        self.channel.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn offload_analysis(&self, snapshot: &AnalysisSnapshot) -> Option<FinancialAnalysis> {
        let channel = self.channel.as_ref()?;
        match channel.send(AnalysisTask::ComplexAnalysis(snapshot.clone())).await {
            Ok(TaskOutput::ComplexAnalysis(analysis)) => Some(analysis),
            Ok(other) => {
                log::error!("❌ Worker answered complex_analysis with {:?}", other);
                None
            }
            Err(e) => {
                log::warn!("⚠️  Offloaded analysis failed, running locally: {}", e);
                None
            }
        }
    }

    /// Main path with basic fallback; never fails
    async fn compute_locally(&self, snapshot: &AnalysisSnapshot) -> FinancialAnalysis {
        tokio::task::yield_now().await;

        match panic::catch_unwind(AssertUnwindSafe(|| complex_analysis(snapshot))) {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                log::warn!("⚠️  Main analysis failed, using basic fallback: {}", e);
                basic_analysis(snapshot, &e.to_string())
            }
            Err(_) => {
                log::error!("❌ Main analysis panicked, using basic fallback");
                basic_analysis(snapshot, "analysis panicked")
            }
        }
    }

    /// Fill ratio of both caches unless a probe is installed
    fn memory_pressure(&self) -> f64 {
        if let Some(probe) = &self.memory_probe {
            return probe().clamp(0.0, 1.0);
        }
        let used = self.analysis_cache.inner().len() + self.task_cache.len();
        let capacity = self.analysis_cache.inner().max_size() + self.task_cache.max_size();
        if capacity == 0 {
            return 0.0;
        }
        used as f64 / capacity as f64
    }

    fn record(&self, calculation_time_ms: f64, cache_hit: bool, used_offload: bool, input_size: usize) {
        self.samples.lock().unwrap().record(PerformanceSample {
            calculation_time_ms,
            cache_hit,
            used_offload,
            input_size,
        });
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TransactionType;
    use chrono::NaiveDate;

    fn make_tx(id: &str, amount: f64, kind: TransactionType) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount,
            category: "general".to_string(),
            kind,
            date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        }
    }

    fn local_engine() -> SchedulingEngine {
        SchedulingEngine::new(EngineConfig::default(), None)
    }

    #[tokio::test]
    async fn test_no_channel_runs_locally() {
        let engine = local_engine();
        let txs = vec![make_tx("1", 50.0, TransactionType::Income)];

        let outcome = engine.run_analysis(&txs, &[], 50.0).await;

        assert!(!outcome.from_cache);
        assert!(!outcome.used_offload);
        assert_eq!(outcome.analysis.total_income, 50.0);
    }

    #[tokio::test]
    async fn test_invalid_input_falls_back_to_basic() {
        let engine = local_engine();
        let txs = vec![
            make_tx("1", 100.0, TransactionType::Income),
            make_tx("2", f64::NAN, TransactionType::Expense),
        ];

        let outcome = engine.run_analysis(&txs, &[], 0.0).await;

        assert_eq!(outcome.analysis.total_income, 100.0);
        assert_eq!(outcome.analysis.total_expenses, 0.0);
        assert!(outcome.analysis.error.is_some());
    }

    #[tokio::test]
    async fn test_execute_memoizes_local_tasks() {
        let engine = local_engine();
        let task = AnalysisTask::TrendAnalysis {
            series: vec![1.0, 2.0, 3.0],
        };

        engine.execute(task.clone()).await.unwrap();
        engine.execute(task).await.unwrap();

        let StatsReport::Ready(stats) = engine.get_stats() else {
            panic!("expected stats");
        };
        assert_eq!(stats.sample_count, 2);
        assert!((stats.cache_hit_rate - 0.5).abs() < 1e-9);
        assert_eq!(engine.cache_stats().tasks.size, 1);
    }

    #[tokio::test]
    async fn test_execute_surfaces_analysis_errors() {
        let engine = local_engine();
        let result = engine
            .execute(AnalysisTask::RiskMetrics { series: vec![] })
            .await;

        assert!(matches!(
            result,
            Err(EngineError::Analysis(AnalysisError::InsufficientData { .. }))
        ));
    }

    #[tokio::test]
    async fn test_offloaded_result_is_memoized() {
        let engine = SchedulingEngine::with_thread_worker(EngineConfig::default()).await;
        let task = AnalysisTask::TrendAnalysis {
            series: vec![1.0, 2.0, 3.0],
        };

        let first = engine.execute(task.clone()).await.unwrap();
        let second = engine.execute(task).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.cache_stats().tasks.size, 1);
        let StatsReport::Ready(stats) = engine.get_stats() else {
            panic!("expected stats");
        };
        assert!((stats.offload_rate - 0.5).abs() < 1e-9);
        assert!((stats.cache_hit_rate - 0.5).abs() < 1e-9);

        if let Some(channel) = engine.channel() {
            channel.shutdown();
        }
    }

    #[tokio::test]
    async fn test_non_finite_tasks_skip_memo() {
        let engine = local_engine();
        let nan = AnalysisTask::TrendAnalysis {
            series: vec![1.0, f64::NAN],
        };
        let inf = AnalysisTask::TrendAnalysis {
            series: vec![1.0, f64::INFINITY],
        };

        engine.execute(nan).await.unwrap();
        engine.execute(inf).await.unwrap();

        assert_eq!(engine.cache_stats().tasks.size, 0);
    }

    #[test]
    fn test_memory_probe_feeds_decision() {
        let engine = local_engine().with_memory_probe(Box::new(|| 0.95));
        let decision = engine.scheduling_decision(10);

        assert_eq!(decision.signals.memory_pressure, 0.95);
        assert!(!decision.factors.memory_available);
        assert!(!decision.offload);
    }

    #[tokio::test]
    async fn test_cleanup_resets_everything() {
        let engine = local_engine();
        let txs = vec![make_tx("1", 10.0, TransactionType::Expense)];
        engine.run_analysis(&txs, &[], 0.0).await;

        engine.cleanup();

        assert_eq!(engine.get_stats(), StatsReport::NoData);
        assert_eq!(engine.cache_stats().analysis.size, 0);
        assert!(!engine.run_analysis(&txs, &[], 0.0).await.from_cache);
    }
}
