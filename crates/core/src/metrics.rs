//! Prometheus metrics for the conversion engine.
//!
//! This module provides metrics for:
//! - Conversions (requests by family and result, duration)
//! - Backends (attempts by outcome)
//! - Worker pool (active and queued jobs)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Conversions
// =============================================================================

/// Conversions by source family and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconv_conversions_total", "Total conversion requests"),
        &["family", "result"], // "success", "failed"
    )
    .unwrap()
});

/// End-to-end conversion duration.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "omniconv_conversion_duration_seconds",
            "Duration of conversion requests",
        )
        .buckets(vec![0.05, 0.25, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["family"],
    )
    .unwrap()
});

// =============================================================================
// Backends
// =============================================================================

/// Backend attempts by backend id and outcome.
pub static BACKEND_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "omniconv_backend_attempts_total",
            "Total backend attempts",
        ),
        &["backend", "outcome"], // "success", "recoverable", "fatal"
    )
    .unwrap()
});

// =============================================================================
// Worker pool
// =============================================================================

/// Blocking jobs currently running.
pub static WORKER_POOL_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "omniconv_worker_pool_active",
        "Blocking jobs currently running",
    )
    .unwrap()
});

/// Blocking jobs waiting for a worker.
pub static WORKER_POOL_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "omniconv_worker_pool_queued",
        "Blocking jobs waiting for a worker",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(BACKEND_ATTEMPTS.clone()),
        Box::new(WORKER_POOL_ACTIVE.clone()),
        Box::new(WORKER_POOL_QUEUED.clone()),
    ]
}
