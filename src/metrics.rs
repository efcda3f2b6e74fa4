// Prometheus metrics for the LXD driver session
//
// - Session calls by operation and outcome (counter)
// - Remote API failures by remote call (counter)
// - Operation wait durations (histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref SESSION_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lxd_session_calls_total", "Session calls by operation and outcome"),
        &["operation", "outcome"]
    ).expect("Failed to create session calls metric");

    pub static ref API_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lxd_api_errors_total", "Remote LXD API failures by call"),
        &["call"]
    ).expect("Failed to create API errors metric");

    pub static ref OPERATION_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("lxd_operation_wait_seconds", "Time spent waiting for LXD operations"),
    ).expect("Failed to create operation wait metric");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    register(Box::new(SESSION_CALLS_TOTAL.clone()))?;
    register(Box::new(API_ERRORS_TOTAL.clone()))?;
    register(Box::new(OPERATION_WAIT_SECONDS.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Record the outcome of one session call
pub fn record_call(operation: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    SESSION_CALLS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a failed remote call
pub fn record_api_error(call: &str) {
    API_ERRORS_TOTAL.with_label_values(&[call]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_record_call() {
        let before = SESSION_CALLS_TOTAL
            .with_label_values(&["metrics_test_op", "error"])
            .get();
        record_call("metrics_test_op", false);
        let after = SESSION_CALLS_TOTAL
            .with_label_values(&["metrics_test_op", "error"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_gather_contains_registered_metrics() {
        init().unwrap();
        record_api_error("metrics_test_call");
        let text = gather().unwrap();
        assert!(text.contains("lxd_api_errors_total"));
    }
}
