//! Pipeline metrics: sync runs, search requests, embedding calls, index size.

use metrics::{counter, gauge, histogram};

/// Metrics recorder for the vectorization pipeline
pub struct VectorizationMetrics;

impl VectorizationMetrics {
    // =========================================================================
    // Sync
    // =========================================================================

    /// Record a finished sync run
    pub fn record_sync_run(
        namespace: &str,
        succeeded: usize,
        failed: usize,
        deleted: usize,
        cancelled: bool,
        duration_ms: u64,
    ) {
        let outcome = match (cancelled, failed) {
            (true, _) => "cancelled",
            (false, 0) => "success",
            (false, _) => "partial",
        };

        counter!(
            "vectorization_sync_runs_total",
            "namespace" => namespace.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        counter!(
            "vectorization_sync_records_total",
            "namespace" => namespace.to_string(),
            "status" => "succeeded"
        )
        .increment(succeeded as u64);
        counter!(
            "vectorization_sync_records_total",
            "namespace" => namespace.to_string(),
            "status" => "failed"
        )
        .increment(failed as u64);
        counter!(
            "vectorization_sync_records_total",
            "namespace" => namespace.to_string(),
            "status" => "deleted"
        )
        .increment(deleted as u64);
        histogram!(
            "vectorization_sync_duration_seconds",
            "namespace" => namespace.to_string()
        )
        .record(duration_ms as f64 / 1000.0);

        tracing::debug!(
            namespace,
            succeeded,
            failed,
            deleted,
            cancelled,
            duration_ms,
            "Recorded sync run"
        );
    }

    /// Sync rejected because another run holds the namespace
    pub fn record_sync_conflict(namespace: &str) {
        counter!(
            "vectorization_sync_runs_total",
            "namespace" => namespace.to_string(),
            "outcome" => "conflict"
        )
        .increment(1);
    }

    pub fn set_watermark(namespace: &str, last_record_id: i64) {
        gauge!("vectorization_sync_watermark", "namespace" => namespace.to_string())
            .set(last_record_id as f64);
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// `status` is `ok`, `empty`, `invalid` or `unavailable`
    pub fn record_search(namespace: &str, status: &'static str, duration_ms: u64) {
        counter!(
            "vectorization_search_requests_total",
            "namespace" => namespace.to_string(),
            "status" => status
        )
        .increment(1);
        histogram!(
            "vectorization_search_duration_seconds",
            "namespace" => namespace.to_string()
        )
        .record(duration_ms as f64 / 1000.0);
    }

    // =========================================================================
    // Embedding
    // =========================================================================

    pub fn record_embedding_call(provider: &str, outcome: &'static str, inputs: usize) {
        counter!(
            "vectorization_embedding_requests_total",
            "provider" => provider.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        tracing::trace!(provider, outcome, inputs, "Embedding call");
    }

    pub fn record_embedding_retry(provider: &str) {
        counter!(
            "vectorization_embedding_retries_total",
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    // =========================================================================
    // Index
    // =========================================================================

    pub fn set_index_documents(namespace: &str, count: usize) {
        gauge!("vectorization_index_documents", "namespace" => namespace.to_string())
            .set(count as f64);
    }
}
