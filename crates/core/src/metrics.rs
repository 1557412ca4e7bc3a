//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Batches (submitted, finished by status)
//! - Items (results, failures by stage, processing time)
//!
//! The server registers everything returned by [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Batch Metrics
// =============================================================================

/// Batches accepted by the orchestrator.
pub static BATCHES_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidtune_batches_submitted_total",
        "Total batches accepted for processing",
    )
    .unwrap()
});

/// Batches that reached a terminal state.
pub static BATCHES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidtune_batches_finished_total",
            "Total batches that reached a terminal state",
        ),
        &["status"], // "completed", "failed", "timed_out"
    )
    .unwrap()
});

// =============================================================================
// Item Metrics
// =============================================================================

/// Items processed by result.
pub static ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidtune_items_total", "Total items processed"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Item failures by the stage that failed.
pub static ITEM_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidtune_item_failures_total",
            "Total item failures by pipeline stage",
        ),
        &["stage"],
    )
    .unwrap()
});

/// Wall time of one item pipeline.
pub static ITEM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidtune_item_duration_seconds",
            "Duration of one item pipeline",
        )
        .buckets(vec![
            0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Batches
        Box::new(BATCHES_SUBMITTED.clone()),
        Box::new(BATCHES_FINISHED.clone()),
        // Items
        Box::new(ITEMS_TOTAL.clone()),
        Box::new(ITEM_FAILURES.clone()),
        Box::new(ITEM_DURATION.clone()),
    ]
}
