//! Prometheus metrics for debt-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder for the HTTP middleware metrics. `None` when another recorder
/// was already installed in this process.
static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// HTTP request counter by operation and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "debt_http_requests_total",
        "Total number of debt API requests",
        &["operation", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// Settlement counter by outcome (no client label to keep cardinality low).
pub static SETTLEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "debt_settlements_total",
        "Total number of settlement attempts",
        &["outcome"] // settled, no_debt, error
    )
    .expect("Failed to register settlements_total")
});

/// Sum of amounts applied to invoices, in currency units.
pub static SETTLED_AMOUNT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "debt_settled_amount_total",
        "Total amount applied to invoices"
    )
    .expect("Failed to register settled_amount_total")
});

/// Sum of payment remainders that exceeded the client's debt.
pub static UNALLOCATED_AMOUNT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "debt_unallocated_amount_total",
        "Total amount received beyond outstanding debt"
    )
    .expect("Failed to register unallocated_amount_total")
});

/// Invoices touched by settlements, by resulting status.
pub static INVOICES_SETTLED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "debt_invoices_settled_total",
        "Total number of invoices updated by settlements",
        &["status"]
    )
    .expect("Failed to register invoices_settled_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "debt_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "debt_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Install the HTTP metrics recorder and register the domain metrics.
/// Safe to call more than once.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    });

    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&SETTLEMENTS_TOTAL);
    Lazy::force(&SETTLED_AMOUNT_TOTAL);
    Lazy::force(&UNALLOCATED_AMOUNT_TOTAL);
    Lazy::force(&INVOICES_SETTLED_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format: HTTP metrics first, then the
/// domain metrics from the default registry.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Ok(domain_metrics) = encoder.encode_to_string(&metric_families) {
        output.push_str(&domain_metrics);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_metrics_are_exposed() {
        init_metrics();
        SETTLEMENTS_TOTAL.with_label_values(&["settled"]).inc();

        let output = get_metrics();

        assert!(output.contains("debt_settlements_total"));
    }
}
