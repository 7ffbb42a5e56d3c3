//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Execution service (reservations and their cancellation)
//! - Orchestrator (completed and failed runs)
//! - Optimizer (strategy chosen, task outcomes and durations)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Execution Metrics
// =============================================================================

/// Execution requests by result.
pub static LOTTERY_EXECUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lottery_executions_total",
            "Total lottery execution requests",
        ),
        &["result"], // "reserved", "rejected"
    )
    .unwrap()
});

/// Reservations given up and published again for retry.
pub static RESERVATIONS_CANCELLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "lottery_reservations_cancelled_total",
        "Total execution reservations cancelled",
    )
    .unwrap()
});

/// Orchestrated runs by outcome.
pub static ORCHESTRATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lottery_orchestrations_total",
            "Total orchestrated lottery runs",
        ),
        &["outcome"], // "completed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Optimizer Metrics
// =============================================================================

/// Strategy that produced each group's distribution.
pub static SOLVER_STRATEGY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lottery_solver_strategy_total",
            "Groups distributed per strategy",
        ),
        &["strategy"], // "direct", "hybrid", "greedy"
    )
    .unwrap()
});

/// Optimizer task runs by task and outcome.
pub static OPTIMIZER_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("lottery_optimizer_runs_total", "Total optimizer task runs"),
        &["task", "outcome"], // outcome: "success", "infeasible", "timeout", "error"
    )
    .unwrap()
});

/// Optimizer task duration in seconds.
pub static OPTIMIZER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "lottery_optimizer_duration_seconds",
            "Duration of optimizer tasks",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["task"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(LOTTERY_EXECUTIONS.clone()),
        Box::new(RESERVATIONS_CANCELLED.clone()),
        Box::new(ORCHESTRATIONS.clone()),
        Box::new(SOLVER_STRATEGY.clone()),
        Box::new(OPTIMIZER_RUNS.clone()),
        Box::new(OPTIMIZER_DURATION.clone()),
    ]
}
