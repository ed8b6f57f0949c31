//! Financial analysis layer
//!
//! - `types` - Ledger records (transactions, goals) and result structures
//! - `compute` - Main and basic analysis paths plus trend, risk and projection tasks

pub mod compute;
pub mod types;

pub use compute::{
    basic_analysis, complex_analysis, projection_analysis, risk_metrics, trend_analysis,
    MAX_PROJECTION_HORIZON,
};
pub use types::{
    AnalysisOutcome, AnalysisSnapshot, FinancialAnalysis, Goal, GoalProgress, MonthlySummary,
    ProjectionPoint, ProjectionReport, RiskMetrics, Transaction, TransactionType, TrendDirection,
    TrendReport,
};
