//! Analysis computations
//!
//! These run either on the caller's side or inside the background worker;
//! both paths call the same functions so results never depend on where they
//! were computed.

use super::types::{
    AnalysisSnapshot, FinancialAnalysis, GoalProgress, MonthlySummary, ProjectionPoint,
    ProjectionReport, RiskMetrics, TransactionType, TrendDirection, TrendReport,
};
use crate::error::AnalysisError;
use crate::stats;
use std::collections::BTreeMap;

/// Relative slope below which a trend counts as flat
const FLAT_TREND_TOLERANCE: f64 = 0.01;

/// Months per seasonal cycle
const SEASON_PERIOD: usize = 12;

const MOVING_AVERAGE_WINDOW: usize = 3;

/// Longest projection accepted (50 years)
pub const MAX_PROJECTION_HORIZON: u32 = 600;

/// Months of expenses a balance must cover for full marks
const TARGET_COVERAGE_MONTHS: f64 = 6.0;

/// Full analysis of a snapshot (the main computation path)
///
/// Rejects non-finite amounts or balance so the caller can fall back to
/// `basic_analysis`.
pub fn complex_analysis(snapshot: &AnalysisSnapshot) -> Result<FinancialAnalysis, AnalysisError> {
    validate(snapshot)?;

    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut category_breakdown: BTreeMap<String, f64> = BTreeMap::new();
    let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for tx in &snapshot.transactions {
        let amount = tx.amount.abs();
        let bucket = months.entry(tx.date.format("%Y-%m").to_string()).or_default();
        match tx.kind {
            TransactionType::Income => {
                total_income += amount;
                bucket.0 += amount;
            }
            TransactionType::Expense => {
                total_expenses += amount;
                bucket.1 += amount;
                *category_breakdown.entry(tx.category.clone()).or_default() += amount;
            }
        }
    }

    let monthly: Vec<MonthlySummary> = months
        .into_iter()
        .map(|(month, (income, expenses))| MonthlySummary {
            month,
            income,
            expenses,
            net: income - expenses,
        })
        .collect();

    let nets: Vec<f64> = monthly.iter().map(|m| m.net).collect();
    let (trend, risk) = if nets.len() >= 2 {
        (Some(trend_analysis(&nets)), risk_metrics(&nets).ok())
    } else {
        (None, None)
    };

    let goal_progress: Vec<GoalProgress> = snapshot
        .goals
        .iter()
        .map(|goal| {
            let progress = if goal.target_amount > 0.0 {
                (goal.current_amount / goal.target_amount).clamp(0.0, 1.0)
            } else {
                1.0
            };
            GoalProgress {
                goal_id: goal.id.clone(),
                progress,
                remaining: (goal.target_amount - goal.current_amount).max(0.0),
            }
        })
        .collect();

    let expenses: Vec<(&str, f64)> = snapshot
        .transactions
        .iter()
        .filter(|tx| tx.kind == TransactionType::Expense)
        .map(|tx| (tx.id.as_str(), tx.amount.abs()))
        .collect();
    let expense_amounts: Vec<f64> = expenses.iter().map(|(_, amount)| *amount).collect();
    let anomalies = stats::detect_outliers(&expense_amounts)
        .indices
        .into_iter()
        .map(|i| expenses[i].0.to_string())
        .collect();

    let net_cash_flow = total_income - total_expenses;
    let savings_rate = savings_rate(total_income, net_cash_flow);
    let monthly_expenses: Vec<f64> = monthly.iter().map(|m| m.expenses).collect();
    let health_score = health_score(
        savings_rate,
        snapshot.balance,
        &monthly_expenses,
        &goal_progress,
    );

    Ok(FinancialAnalysis {
        total_income,
        total_expenses,
        net_cash_flow,
        savings_rate,
        category_breakdown,
        monthly,
        trend,
        risk,
        goal_progress,
        anomalies,
        health_score,
        error: None,
    })
}

/// Minimal analysis that only sums what is knowable; never fails
///
/// Non-finite amounts are skipped. `reason` is recorded in `error`.
pub fn basic_analysis(snapshot: &AnalysisSnapshot, reason: &str) -> FinancialAnalysis {
    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    for tx in snapshot.transactions.iter().filter(|tx| tx.amount.is_finite()) {
        match tx.kind {
            TransactionType::Income => total_income += tx.amount.abs(),
            TransactionType::Expense => total_expenses += tx.amount.abs(),
        }
    }

    let net_cash_flow = total_income - total_expenses;
    FinancialAnalysis {
        total_income,
        total_expenses,
        net_cash_flow,
        savings_rate: savings_rate(total_income, net_cash_flow),
        error: Some(reason.to_string()),
        ..Default::default()
    }
}

/// Regression, direction, smoothing and seasonality of a monthly series
pub fn trend_analysis(series: &[f64]) -> TrendReport {
    let fit = stats::linear_regression(series);
    let scale = stats::mean(&series.iter().map(|v| v.abs()).collect::<Vec<_>>());

    let direction = if scale == 0.0 {
        TrendDirection::Flat
    } else {
        let relative = fit.slope / scale;
        if relative > FLAT_TREND_TOLERANCE {
            TrendDirection::Rising
        } else if relative < -FLAT_TREND_TOLERANCE {
            TrendDirection::Falling
        } else {
            TrendDirection::Flat
        }
    };

    TrendReport {
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared,
        direction,
        moving_average: stats::moving_average(series, MOVING_AVERAGE_WINDOW),
        seasonality: stats::seasonality_indices(series, SEASON_PERIOD),
    }
}

/// Dispersion and downside metrics of a series
pub fn risk_metrics(series: &[f64]) -> Result<RiskMetrics, AnalysisError> {
    if series.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            required: 2,
            actual: series.len(),
        });
    }
    ensure_finite(series)?;

    let cumulative: Vec<f64> = series
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect();

    Ok(RiskMetrics {
        volatility: stats::standard_deviation(series),
        coefficient_of_variation: stats::volatility(series),
        value_at_risk_5: stats::percentile(series, 5.0),
        max_drawdown: stats::max_drawdown(&cumulative),
        outlier_count: stats::detect_outliers(series).indices.len(),
    })
}

/// Project a balance forward from the trend of monthly net cash flow
///
/// The expected path follows the regression line; the optimistic and
/// pessimistic bands widen by one stddev times the square root of elapsed months.
pub fn projection_analysis(
    balance: f64,
    monthly_net: &[f64],
    horizon_months: u32,
) -> Result<ProjectionReport, AnalysisError> {
    if horizon_months == 0 {
        return Err(AnalysisError::InvalidInput(
            "projection horizon must be at least one month".to_string(),
        ));
    }
    if horizon_months > MAX_PROJECTION_HORIZON {
        return Err(AnalysisError::InvalidInput(format!(
            "projection horizon of {} months exceeds the {} month limit",
            horizon_months, MAX_PROJECTION_HORIZON
        )));
    }
    if monthly_net.is_empty() {
        return Err(AnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if !balance.is_finite() {
        return Err(AnalysisError::InvalidInput("balance is not finite".to_string()));
    }
    ensure_finite(monthly_net)?;

    let n = monthly_net.len();
    let (slope, intercept) = if n >= 2 {
        let fit = stats::linear_regression(monthly_net);
        (fit.slope, fit.intercept)
    } else {
        (0.0, monthly_net[0])
    };
    let spread = stats::standard_deviation(monthly_net);

    let mut points = Vec::with_capacity(horizon_months as usize);
    let mut expected = balance;
    let mut months_until_depleted = None;

    for month_offset in 1..=horizon_months {
        let index = (n - 1) as f64 + month_offset as f64;
        expected += intercept + slope * index;
        let band = spread * (month_offset as f64).sqrt();

        if expected < 0.0 && months_until_depleted.is_none() {
            months_until_depleted = Some(month_offset);
        }

        points.push(ProjectionPoint {
            month_offset,
            expected,
            optimistic: expected + band,
            pessimistic: expected - band,
        });
    }

    Ok(ProjectionReport {
        starting_balance: balance,
        points,
        months_until_depleted,
    })
}

fn validate(snapshot: &AnalysisSnapshot) -> Result<(), AnalysisError> {
    if !snapshot.balance.is_finite() {
        return Err(AnalysisError::InvalidInput("balance is not finite".to_string()));
    }
    if let Some(tx) = snapshot.transactions.iter().find(|tx| !tx.amount.is_finite()) {
        return Err(AnalysisError::InvalidInput(format!(
            "transaction {} has a non-finite amount",
            tx.id
        )));
    }
    if let Some(goal) = snapshot
        .goals
        .iter()
        .find(|g| !g.target_amount.is_finite() || !g.current_amount.is_finite())
    {
        return Err(AnalysisError::InvalidInput(format!(
            "goal {} has a non-finite amount",
            goal.id
        )));
    }
    Ok(())
}

fn ensure_finite(series: &[f64]) -> Result<(), AnalysisError> {
    if series.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidInput("series contains non-finite values".to_string()))
    }
}

fn savings_rate(total_income: f64, net_cash_flow: f64) -> f64 {
    if total_income > 0.0 {
        net_cash_flow / total_income
    } else {
        0.0
    }
}

/// Weighted 0-100 score
///
/// - Savings rate: 40 (full marks at 50% saved)
/// - Balance coverage of average monthly expenses: 30
/// - Average goal progress: 20 (full marks without goals)
/// - Expense stability: 10
fn health_score(
    savings_rate: f64,
    balance: f64,
    monthly_expenses: &[f64],
    goals: &[GoalProgress],
) -> f64 {
    let savings_component = (savings_rate.clamp(0.0, 0.5) / 0.5) * 40.0;

    let avg_expenses = stats::mean(monthly_expenses);
    let coverage_component = if avg_expenses > 0.0 {
        ((balance / avg_expenses).clamp(0.0, TARGET_COVERAGE_MONTHS) / TARGET_COVERAGE_MONTHS)
            * 30.0
    } else if balance > 0.0 {
        30.0
    } else {
        0.0
    };

    let goal_component = if goals.is_empty() {
        20.0
    } else {
        stats::mean(&goals.iter().map(|g| g.progress).collect::<Vec<_>>()) * 20.0
    };

    let stability_component = (1.0 - stats::volatility(monthly_expenses).min(1.0)) * 10.0;

    (savings_component + coverage_component + goal_component + stability_component)
        .clamp(0.0, 100.0)
}
