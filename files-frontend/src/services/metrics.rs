use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static TOKEN_ACQUISITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static RESOURCE_CHAIN_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

pub fn init_metrics() {
    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("metric can be created");

    let acquisitions_total = IntCounterVec::new(
        Opts::new(
            "token_acquisitions_total",
            "Silent token acquisition attempts by outcome",
        ),
        &["resource", "outcome"],
    )
    .expect("metric can be created");

    let chain_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "resource_chain_duration_seconds",
            "Wall-clock duration of a full per-request resource chain",
        ),
        &["outcome"],
    )
    .expect("metric can be created");

    registry
        .register(Box::new(requests_total.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(acquisitions_total.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(chain_duration.clone()))
        .expect("collector can be registered");

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = TOKEN_ACQUISITIONS_TOTAL.set(acquisitions_total);
    let _ = RESOURCE_CHAIN_DURATION_SECONDS.set(chain_duration);
}

/// Record one silent acquisition attempt. No-op before init (tests).
pub fn observe_acquisition(resource: &str, outcome: &str) {
    if let Some(counter) = TOKEN_ACQUISITIONS_TOTAL.get() {
        counter.with_label_values(&[resource, outcome]).inc();
    }
}

/// Record the wall-clock time of one full resource chain.
pub fn observe_chain_duration(outcome: &str, seconds: f64) {
    if let Some(histogram) = RESOURCE_CHAIN_DURATION_SECONDS.get() {
        histogram.with_label_values(&[outcome]).observe(seconds);
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let registry = REGISTRY.get().expect("metrics registry not initialized");
    let metric_families = registry.gather();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
