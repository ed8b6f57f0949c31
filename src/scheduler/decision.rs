//! Offload scoring
//!
//! Four independent factors each contribute a fixed weight when their
//! condition holds:
//!
//! | Factor | Condition | Weight |
//! |--------|-----------|--------|
//! | Input size | `input_size > min_input_size` | 30 |
//! | Queue depth | `pending < max_queue_depth` | 25 |
//! | Memory | `pressure < max_memory_pressure` | 25 |
//! | Load | `recent_load_ms < max_recent_load_ms` | 20 |
//!
//! The work is offloaded when the total reaches the offload score and the
//! channel reports a live worker.

use super::config::SchedulingThresholds;
use serde::{Deserialize, Serialize};

/// Raw measurements feeding a decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulingSignals {
    pub input_size: usize,
    pub queue_depth: usize,
    /// 0.0-1.0
    pub memory_pressure: f64,
    pub recent_load_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulingFactors {
    pub large_input: bool,
    pub queue_clear: bool,
    pub memory_available: bool,
    pub load_low: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulingDecision {
    pub signals: SchedulingSignals,
    pub factors: SchedulingFactors,
    /// 0-100
    pub score: u32,
    pub channel_available: bool,
    pub offload: bool,
}

pub struct OffloadScorer {
    thresholds: SchedulingThresholds,
}

impl OffloadScorer {
    pub fn new(thresholds: SchedulingThresholds) -> Self {
        Self { thresholds }
    }

    pub fn factors(&self, signals: &SchedulingSignals) -> SchedulingFactors {
        let t = &self.thresholds;
        SchedulingFactors {
            large_input: signals.input_size > t.min_input_size,
            queue_clear: signals.queue_depth < t.max_queue_depth,
            memory_available: signals.memory_pressure < t.max_memory_pressure,
            load_low: signals.recent_load_ms < t.max_recent_load_ms,
        }
    }

    /// Additive score of the factors that hold, capped at 100
    pub fn score(&self, factors: &SchedulingFactors) -> u32 {
        let t = &self.thresholds;
        let mut score = 0;
        if factors.large_input {
            score += t.size_weight;
        }
        if factors.queue_clear {
            score += t.queue_weight;
        }
        if factors.memory_available {
            score += t.memory_weight;
        }
        if factors.load_low {
            score += t.load_weight;
        }
        score.min(100)
    }

    pub fn decide(&self, signals: SchedulingSignals, channel_available: bool) -> SchedulingDecision {
        let factors = self.factors(&signals);
        let score = self.score(&factors);
        SchedulingDecision {
            signals,
            factors,
            score,
            channel_available,
            offload: channel_available && score >= self.thresholds.offload_score,
        }
    }

    pub fn thresholds(&self) -> &SchedulingThresholds {
        &self.thresholds
    }
}
