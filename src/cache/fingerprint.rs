//! Approximate identity for a (transactions, goals, balance) snapshot
//!
//! The fingerprint is built from counts, the first and last transaction ids,
//! the goal progress amounts and the balance. It is not a hash of every
//! record: an edit to a middle transaction that keeps the count and both
//! endpoints unchanged produces the same fingerprint. That staleness is
//! bounded by the analysis TTL, and the data layer can call
//! `AnalysisCache::invalidate_all` after in-place edits.

use super::ttl::TtlCache;
use crate::analysis::{FinancialAnalysis, Goal, Transaction};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Lifetime of a cached analysis (10 minutes)
pub const ANALYSIS_TTL: Duration = Duration::from_secs(600);

const KEY_PREFIX: &str = "analysis:";

/// Cheap cache key for a snapshot
///
/// Format: `{tx_count}:{first_id}:{last_id}|{goal_count}:{amounts}|{balance}`
pub fn fingerprint(transactions: &[Transaction], goals: &[Goal], balance: f64) -> String {
    let first_id = transactions.first().map(|t| t.id.as_str()).unwrap_or("");
    let last_id = transactions.last().map(|t| t.id.as_str()).unwrap_or("");
    let goal_amounts = goals
        .iter()
        .map(|g| g.current_amount.to_string())
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{}:{}:{}|{}:{}|{}",
        transactions.len(),
        first_id,
        last_id,
        goals.len(),
        goal_amounts,
        balance
    )
}

/// Whole-analysis result cache keyed by fingerprint
pub struct AnalysisCache {
    cache: Arc<TtlCache<FinancialAnalysis>>,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(cache: Arc<TtlCache<FinancialAnalysis>>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn key(fingerprint: &str) -> String {
        format!("{}{}", KEY_PREFIX, fingerprint)
    }

    pub fn get_cached_analysis(&self, fingerprint: &str) -> Option<FinancialAnalysis> {
        self.cache.get(&Self::key(fingerprint))
    }

    pub fn set_cached_analysis(&self, fingerprint: &str, analysis: FinancialAnalysis) {
        self.cache.set(&Self::key(fingerprint), analysis, self.ttl);
    }

    /// Drop every cached analysis
    pub fn invalidate_all(&self) -> usize {
        match Regex::new(&format!("^{}", KEY_PREFIX)) {
            Ok(pattern) => self.cache.invalidate_pattern(&pattern),
            Err(e) => {
                log::warn!("⚠️  Could not build analysis invalidation pattern: {}", e);
                0
            }
        }
    }

    pub fn inner(&self) -> &Arc<TtlCache<FinancialAnalysis>> {
        &self.cache
    }
}
