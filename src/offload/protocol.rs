//! Message protocol between the offload channel and the background worker
//!
//! Tasks and outputs are closed enums so both sides of the channel handle
//! every operation kind exhaustively. Everything here is owned data; nothing
//! crossing the channel is shared with the caller.

use crate::analysis::{
    self, AnalysisSnapshot, FinancialAnalysis, ProjectionReport, RiskMetrics, TrendReport,
};
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Correlation token pairing a request with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An analytical operation that can run locally or on the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AnalysisTask {
    ComplexAnalysis(AnalysisSnapshot),
    TrendAnalysis { series: Vec<f64> },
    RiskMetrics { series: Vec<f64> },
    ProjectionAnalysis {
        balance: f64,
        monthly_net: Vec<f64>,
        horizon_months: u32,
    },
}

impl AnalysisTask {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisTask::ComplexAnalysis(_) => "complex_analysis",
            AnalysisTask::TrendAnalysis { .. } => "trend_analysis",
            AnalysisTask::RiskMetrics { .. } => "risk_metrics",
            AnalysisTask::ProjectionAnalysis { .. } => "projection_analysis",
        }
    }

    /// Number of data points the task works over
    pub fn input_size(&self) -> usize {
        match self {
            AnalysisTask::ComplexAnalysis(snapshot) => snapshot.input_size(),
            AnalysisTask::TrendAnalysis { series } | AnalysisTask::RiskMetrics { series } => {
                series.len()
            }
            AnalysisTask::ProjectionAnalysis { monthly_net, .. } => monthly_net.len(),
        }
    }

    /// Whether every float in the task is finite
    pub fn is_finite(&self) -> bool {
        match self {
            AnalysisTask::ComplexAnalysis(snapshot) => {
                snapshot.balance.is_finite()
                    && snapshot.transactions.iter().all(|tx| tx.amount.is_finite())
                    && snapshot
                        .goals
                        .iter()
                        .all(|g| g.target_amount.is_finite() && g.current_amount.is_finite())
            }
            AnalysisTask::TrendAnalysis { series } | AnalysisTask::RiskMetrics { series } => {
                series.iter().all(|v| v.is_finite())
            }
            AnalysisTask::ProjectionAnalysis {
                balance,
                monthly_net,
                ..
            } => balance.is_finite() && monthly_net.iter().all(|v| v.is_finite()),
        }
    }

    /// Run the task on the current thread
    pub fn run(&self) -> Result<TaskOutput, AnalysisError> {
        match self {
            AnalysisTask::ComplexAnalysis(snapshot) => {
                analysis::complex_analysis(snapshot).map(TaskOutput::ComplexAnalysis)
            }
            AnalysisTask::TrendAnalysis { series } => {
                Ok(TaskOutput::TrendAnalysis(analysis::trend_analysis(series)))
            }
            AnalysisTask::RiskMetrics { series } => {
                analysis::risk_metrics(series).map(TaskOutput::RiskMetrics)
            }
            AnalysisTask::ProjectionAnalysis {
                balance,
                monthly_net,
                horizon_months,
            } => analysis::projection_analysis(*balance, monthly_net, *horizon_months)
                .map(TaskOutput::ProjectionAnalysis),
        }
    }
}

/// Result of an `AnalysisTask`, one variant per task kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum TaskOutput {
    ComplexAnalysis(FinancialAnalysis),
    TrendAnalysis(TrendReport),
    RiskMetrics(RiskMetrics),
    ProjectionAnalysis(ProjectionReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffloadRequest {
    pub id: RequestId,
    pub task: AnalysisTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Success(TaskOutput),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffloadResponse {
    pub id: RequestId,
    pub outcome: Outcome,
}

impl OffloadResponse {
    pub fn success(id: RequestId, output: TaskOutput) -> Self {
        Self {
            id,
            outcome: Outcome::Success(output),
        }
    }

    pub fn failure(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Failure(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_serializes_with_kind_tag() {
        let task = AnalysisTask::TrendAnalysis {
            series: vec![1.0, 2.0],
        };
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["kind"], "trend_analysis");
        assert_eq!(json["payload"]["series"][1], 2.0);
        assert_eq!(task.kind(), "trend_analysis");
    }

    #[test]
    fn test_run_reports_analysis_errors() {
        let task = AnalysisTask::RiskMetrics { series: vec![1.0] };
        assert!(task.run().is_err());

        let task = AnalysisTask::TrendAnalysis {
            series: vec![1.0, 2.0, 3.0],
        };
        assert!(matches!(task.run(), Ok(TaskOutput::TrendAnalysis(_))));
    }

    #[test]
    fn test_is_finite() {
        assert!(AnalysisTask::TrendAnalysis {
            series: vec![1.0, 2.0]
        }
        .is_finite());
        assert!(!AnalysisTask::RiskMetrics {
            series: vec![1.0, f64::NAN]
        }
        .is_finite());
        assert!(!AnalysisTask::ProjectionAnalysis {
            balance: f64::INFINITY,
            monthly_net: vec![1.0],
            horizon_months: 3,
        }
        .is_finite());
    }
}
