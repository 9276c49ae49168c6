//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the omniconv server:
//! - HTTP request metrics (latency, counts)
//! - Upload and download counts
//! - Worker pool status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use omniconv_core::metrics::{WORKER_POOL_ACTIVE, WORKER_POOL_QUEUED};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "omniconv_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 120.0, 300.0, 600.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconv_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "omniconv_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// File transfer Metrics
// =============================================================================

/// Uploads by result.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconv_uploads_total", "Total file uploads"),
        &["result"], // "stored", "rejected"
    )
    .unwrap()
});

/// Downloads by kind.
pub static DOWNLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconv_downloads_total", "Total file downloads"),
        &["kind"], // "single", "bundle"
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Transfers
    registry.register(Box::new(UPLOADS_TOTAL.clone())).unwrap();
    registry.register(Box::new(DOWNLOADS_TOTAL.clone())).unwrap();

    // Core metrics (conversions, backends, worker pool)
    for metric in omniconv_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges that mirror live state before encoding.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let pool = state.dispatcher().host().pool_status();
    WORKER_POOL_ACTIVE.set(pool.active_jobs as i64);
    WORKER_POOL_QUEUED.set(pool.queued_jobs as i64);
}

static DOWNLOAD_PATH: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/download/[^/]+$").unwrap());

/// Normalize a path for metric labels (replace file names with placeholders).
pub fn normalize_path(path: &str) -> String {
    DOWNLOAD_PATH
        .replace(path, "/download/{filename}")
        .to_string()
}
