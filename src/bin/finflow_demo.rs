//! FinFlow demo - exercises the scheduling engine end to end
//!
//! Generates a synthetic ledger, analyses it twice (cold, then from cache),
//! runs a batch of trend/risk/projection tasks and prints the results as JSON.
//!
//! Usage:
//!   cargo run --release --bin finflow_demo
//!
//! Environment variables:
//!   FINFLOW_DEMO_TRANSACTIONS - Ledger size (default: 2400)
//!   FINFLOW_* - Engine configuration, see `EngineConfig::from_env`

use chrono::{Duration as ChronoDuration, NaiveDate};
use dotenv::dotenv;
use finflow::analysis::TransactionType;
use finflow::{
    AnalysisTask, BatchOperation, EngineConfig, Goal, SchedulingEngine, TaskOutput, Transaction,
};
use log::{info, warn};
use rand::Rng;
use std::env;
use std::sync::Arc;

const CATEGORIES: [&str; 6] = ["rent", "groceries", "transport", "utilities", "dining", "travel"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = EngineConfig::from_env();
    config.validate()?;

    let size: usize = env::var("FINFLOW_DEMO_TRANSACTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2_400);

    info!("🚀 FinFlow demo");
    info!("   ├─ Transactions: {}", size);
    info!("   ├─ Offload: {}", config.enable_offload);
    info!("   └─ Offload timeout: {}ms", config.offload_timeout.as_millis());

    let engine = Arc::new(SchedulingEngine::with_thread_worker(config).await);

    let transactions = synthetic_ledger(size);
    let goals = vec![
        Goal {
            id: "emergency-fund".to_string(),
            target_amount: 10_000.0,
            current_amount: 3_500.0,
            deadline: NaiveDate::from_ymd_opt(2026, 12, 31).ok_or("invalid deadline")?,
        },
        Goal {
            id: "vacation".to_string(),
            target_amount: 2_500.0,
            current_amount: 2_600.0,
            deadline: NaiveDate::from_ymd_opt(2025, 7, 1).ok_or("invalid deadline")?,
        },
    ];
    let balance = 4_200.0;

    let cold = engine.run_analysis(&transactions, &goals, balance).await;
    info!(
        "📊 Cold analysis: {:.2}ms (offload: {})",
        cold.calculation_time_ms, cold.used_offload
    );

    let warm = engine.run_analysis(&transactions, &goals, balance).await;
    info!(
        "⚡ Second analysis: {:.2}ms (from cache: {})",
        warm.calculation_time_ms, warm.from_cache
    );

    println!("{}", serde_json::to_string_pretty(&cold.analysis)?);

    let monthly_net: Vec<f64> = cold.analysis.monthly.iter().map(|m| m.net).collect();
    let monthly_expenses: Vec<f64> = cold.analysis.monthly.iter().map(|m| m.expenses).collect();

    let results = engine
        .run_batch(vec![
            BatchOperation::new(
                "net_trend",
                AnalysisTask::TrendAnalysis {
                    series: monthly_net.clone(),
                },
            ),
            BatchOperation::new(
                "expense_risk",
                AnalysisTask::RiskMetrics {
                    series: monthly_expenses,
                },
            ),
            BatchOperation::new(
                "one_year_projection",
                AnalysisTask::ProjectionAnalysis {
                    balance,
                    monthly_net,
                    horizon_months: 12,
                },
            ),
        ])
        .await;

    for result in &results {
        match &result.result {
            Ok(TaskOutput::TrendAnalysis(trend)) => {
                info!("   ├─ {}: {:?} (slope {:.2})", result.name, trend.direction, trend.slope)
            }
            Ok(TaskOutput::RiskMetrics(risk)) => {
                info!("   ├─ {}: volatility {:.2}", result.name, risk.volatility)
            }
            Ok(TaskOutput::ProjectionAnalysis(projection)) => info!(
                "   ├─ {}: depleted in {:?} months",
                result.name, projection.months_until_depleted
            ),
            Ok(TaskOutput::ComplexAnalysis(_)) => info!("   ├─ {}: analysis", result.name),
            Err(e) => warn!("   ├─ {}: {}", result.name, e),
        }
    }

    println!("{}", serde_json::to_string_pretty(&engine.get_stats())?);
    info!("   └─ Cache: {:?}", engine.cache_stats());

    if let Some(channel) = engine.channel() {
        channel.shutdown();
    }

    Ok(())
}

/// Two years of random daily activity plus a monthly salary
fn synthetic_ledger(size: usize) -> Vec<Transaction> {
    let mut rng = rand::thread_rng();
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default();

    (0..size)
        .map(|i| {
            let date = start + ChronoDuration::days(rng.gen_range(0..730));
            let (kind, category, amount) = if i % 30 == 0 {
                (TransactionType::Income, "salary", rng.gen_range(3_000.0..4_500.0))
            } else {
                let category = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
                (TransactionType::Expense, category, rng.gen_range(5.0..120.0))
            };
            Transaction {
                id: format!("tx-{}", i),
                amount,
                category: category.to_string(),
                kind,
                date,
            }
        })
        .collect()
}
