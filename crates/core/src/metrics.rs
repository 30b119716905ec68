//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Chapter fetches (cache hits, downloads, joined in-flight fetches)
//! - Chapter list syncs
//! - Source requests
//! - Progress writes

use std::future::Future;
use std::time::Instant;

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Chapter Fetch Metrics
// =============================================================================

/// Chapter fetches total by result.
pub static CHAPTER_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atlas_chapter_fetches_total", "Total chapter fetch requests"),
        &["result"], // "cached", "downloaded", "failed", "not_found"
    )
    .unwrap()
});

/// Callers that waited on a fetch already in flight instead of starting one.
pub static CHAPTER_FETCH_JOINS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atlas_chapter_fetch_joins_total",
        "Total chapter requests that joined an in-flight fetch",
    )
    .unwrap()
});

// =============================================================================
// Library Metrics
// =============================================================================

/// Chapter list syncs total by result.
pub static CHAPTER_SYNCS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atlas_chapter_syncs_total", "Total chapter list syncs"),
        &["result"], // "replaced", "kept_existing"
    )
    .unwrap()
});

// =============================================================================
// Source Metrics
// =============================================================================

/// Source requests total.
pub static SOURCE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atlas_source_requests_total", "Total novel source requests"),
        &["source", "operation", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// Source request duration.
pub static SOURCE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "atlas_source_request_duration_seconds",
            "Duration of novel source requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["source", "operation"],
    )
    .unwrap()
});

// =============================================================================
// Progress Metrics
// =============================================================================

/// Durable progress writes by kind.
pub static PROGRESS_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atlas_progress_writes_total", "Total reading progress writes"),
        &["kind"], // "debounced", "flushed", "reset"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record the outcome and duration of one source request.
pub fn record_source_request(source: &str, operation: &str, success: bool, elapsed_secs: f64) {
    let result = if success { "success" } else { "error" };
    SOURCE_REQUESTS
        .with_label_values(&[source, operation, result])
        .inc();
    SOURCE_REQUEST_DURATION
        .with_label_values(&[source, operation])
        .observe(elapsed_secs);
}

/// Await a source request, recording its outcome and duration.
pub async fn timed_source_request<T, E, F>(source: &str, operation: &str, request: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = request.await;
    record_source_request(
        source,
        operation,
        result.is_ok(),
        start.elapsed().as_secs_f64(),
    );
    result
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Fetch
        Box::new(CHAPTER_FETCHES.clone()),
        Box::new(CHAPTER_FETCH_JOINS.clone()),
        // Library
        Box::new(CHAPTER_SYNCS.clone()),
        // Sources
        Box::new(SOURCE_REQUESTS.clone()),
        Box::new(SOURCE_REQUEST_DURATION.clone()),
        // Progress
        Box::new(PROGRESS_WRITES.clone()),
    ]
}
