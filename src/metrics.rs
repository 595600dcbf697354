// Prometheus metrics for the Pdfbirch server
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Quota decisions by operation and outcome (counter)
// - Documents rendered and render latency (counter, histogram)
// - Authentication failures by reason (counter)
// - Quota store failures (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Quota metrics
    pub static ref QUOTA_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quota_decisions_total", "Quota decisions by operation and outcome"),
        &["operation", "outcome"]
    ).expect("Failed to create quota decisions metric");

    pub static ref QUOTA_STORE_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "quota_store_errors_total",
        "Total number of quota store failures"
    ).expect("Failed to create quota store errors metric");

    // Document metrics
    pub static ref DOCUMENTS_RENDERED_TOTAL: IntCounter = IntCounter::new(
        "documents_rendered_total",
        "Total number of documents rendered since server start"
    ).expect("Failed to create documents rendered metric");

    pub static ref DOCUMENT_RENDER_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("document_render_seconds", "Time spent rendering one document"),
    ).expect("Failed to create render duration metric");

    // Auth metrics
    pub static ref AUTH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_failures_total", "Authentication failures by reason"),
        &["reason"]
    ).expect("Failed to create auth failures metric");
}

static INIT: Once = Once::new();

/// Register all metrics with the registry
///
/// Safe to call more than once; only the first call registers.
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(QUOTA_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_STORE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DOCUMENTS_RENDERED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DOCUMENT_RENDER_SECONDS.clone()))?;
    REGISTRY.register(Box::new(AUTH_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
