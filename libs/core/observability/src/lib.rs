//! Metrics for the vectorization pipeline.
//!
//! - Prometheus recorder and `/metrics` rendering
//! - [`VectorizationMetrics`] for sync, search and embedding operations
//! - Axum middleware for per-route request metrics
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, VectorizationMetrics};
//!
//! init_metrics()?;
//! VectorizationMetrics::record_search("demographic", "ok", 12);
//!
//! let app = Router::new().route("/metrics", get(metrics_handler));
//! ```

pub mod middleware;
pub mod vectorization;

pub use middleware::metrics_middleware;
pub use vectorization::VectorizationMetrics;

pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once per process.
///
/// Subsequent calls return the existing handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();
        Ok(handle)
    })
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for `/metrics`
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    describe_counter!(
        "vectorization_sync_runs_total",
        "Sync runs by namespace and outcome"
    );
    describe_counter!(
        "vectorization_sync_records_total",
        "Records processed by sync, by namespace and status"
    );
    describe_histogram!(
        "vectorization_sync_duration_seconds",
        "Sync run duration in seconds"
    );
    describe_gauge!(
        "vectorization_sync_watermark",
        "Last fully synced record id per namespace"
    );
    describe_counter!(
        "vectorization_search_requests_total",
        "Search requests by namespace and status"
    );
    describe_histogram!(
        "vectorization_search_duration_seconds",
        "Search latency in seconds"
    );
    describe_counter!(
        "vectorization_embedding_retries_total",
        "Embedding provider retries after transient failures"
    );
    describe_counter!(
        "vectorization_embedding_requests_total",
        "Embedding provider calls by outcome"
    );
    describe_gauge!(
        "vectorization_index_documents",
        "Documents stored per namespace collection"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_renders_after_init() {
        let handle = init_metrics().expect("recorder installs once");
        VectorizationMetrics::record_search("demographic", "ok", 5);

        // Second init returns the same handle
        let again = init_metrics().unwrap();
        assert!(std::ptr::eq(handle, again));

        let body = metrics_handler().await;
        assert!(body.contains("vectorization_search_requests_total"));
    }
}
