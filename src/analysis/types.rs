//! Inbound ledger records and outbound analysis results

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

/// A single ledger entry supplied by the data layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub date: NaiveDate,
}

/// A savings goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub deadline: NaiveDate,
}

/// Owned copy of the data an analysis runs over
///
/// This is what crosses the offload boundary; the worker never sees the
/// caller's buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub transactions: Vec<Transaction>,
    pub goals: Vec<Goal>,
    pub balance: f64,
}

impl AnalysisSnapshot {
    pub fn new(transactions: &[Transaction], goals: &[Goal], balance: f64) -> Self {
        Self {
            transactions: transactions.to_vec(),
            goals: goals.to_vec(),
            balance,
        }
    }

    /// Record count used by the scheduling heuristics
    pub fn input_size(&self) -> usize {
        self.transactions.len() + self.goals.len()
    }
}

/// Income / expense totals for one calendar month (`YYYY-MM`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub month: String,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
    pub moving_average: Vec<f64>,
    /// Per-month seasonal indices, empty unless two full years are present
    pub seasonality: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Population stddev of the series
    pub volatility: f64,
    pub coefficient_of_variation: f64,
    /// 5th percentile of the series
    pub value_at_risk_5: f64,
    pub max_drawdown: f64,
    pub outlier_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub month_offset: u32,
    pub expected: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub starting_balance: f64,
    pub points: Vec<ProjectionPoint>,
    /// First month the expected balance drops below zero
    pub months_until_depleted: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub goal_id: String,
    /// Fraction complete, capped at 1.0
    pub progress: f64,
    pub remaining: f64,
}

/// Full result of analysing a snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinancialAnalysis {
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    /// Net cash flow over income, 0 without income
    pub savings_rate: f64,
    pub category_breakdown: BTreeMap<String, f64>,
    pub monthly: Vec<MonthlySummary>,
    pub trend: Option<TrendReport>,
    pub risk: Option<RiskMetrics>,
    pub goal_progress: Vec<GoalProgress>,
    /// Ids of expense transactions flagged as outliers
    pub anomalies: Vec<String>,
    /// 0-100
    pub health_score: f64,
    /// Set only by the basic fallback computation
    pub error: Option<String>,
}

/// Analysis plus execution metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analysis: FinancialAnalysis,
    pub from_cache: bool,
    pub used_offload: bool,
    pub calculation_time_ms: f64,
}
