//! Rolling performance samples used by the scheduling heuristics

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Samples kept for statistics
pub const SAMPLE_CAPACITY: usize = 100;

/// Samples averaged for the recent-load signal
pub const RECENT_LOAD_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub calculation_time_ms: f64,
    pub cache_hit: bool,
    pub used_offload: bool,
    pub input_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub sample_count: usize,
    pub average_calculation_time_ms: f64,
    /// Fraction of samples answered from cache
    pub cache_hit_rate: f64,
    /// Fraction of samples computed on the worker
    pub offload_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsReport {
    NoData,
    Ready(EngineStats),
}

/// Bounded ring of the most recent samples
#[derive(Debug, Default)]
pub struct PerformanceLog {
    samples: VecDeque<PerformanceSample>,
}

impl PerformanceLog {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
        }
    }

    pub fn record(&mut self, sample: PerformanceSample) {
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean calculation time of the latest samples (0 without samples)
    pub fn recent_load_ms(&self) -> f64 {
        let recent: Vec<f64> = self
            .samples
            .iter()
            .rev()
            .take(RECENT_LOAD_WINDOW)
            .map(|s| s.calculation_time_ms)
            .collect();
        crate::stats::mean(&recent)
    }

    pub fn report(&self) -> StatsReport {
        if self.samples.is_empty() {
            return StatsReport::NoData;
        }

        let count = self.samples.len() as f64;
        let total_time: f64 = self.samples.iter().map(|s| s.calculation_time_ms).sum();
        let hits = self.samples.iter().filter(|s| s.cache_hit).count() as f64;
        let offloaded = self.samples.iter().filter(|s| s.used_offload).count() as f64;

        StatsReport::Ready(EngineStats {
            sample_count: self.samples.len(),
            average_calculation_time_ms: total_time / count,
            cache_hit_rate: hits / count,
            offload_rate: offloaded / count,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
