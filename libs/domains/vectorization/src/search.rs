use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use observability::VectorizationMetrics;
use tracing::{debug, instrument};
use validator::Validate;

use crate::config::SearchConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{VectorizationError, VectorizationResult, with_timeout};
use crate::index::VectorIndexStore;
use crate::models::{SearchRequest, SearchResponse, SearchResult};

/// Semantic search over one namespace
pub struct QueryService {
    embedder: EmbeddingClient,
    store: Arc<dyn VectorIndexStore>,
    config: SearchConfig,
}

impl QueryService {
    pub fn new(embedder: EmbeddingClient, store: Arc<dyn VectorIndexStore>, config: SearchConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Resolve defaults and check bounds, returning `(top_k, threshold)`
    fn validate(&self, request: &SearchRequest) -> VectorizationResult<(usize, f32)> {
        request
            .validate()
            .map_err(|e| VectorizationError::InvalidQuery(e.to_string()))?;

        if request.query.trim().is_empty() {
            return Err(VectorizationError::InvalidQuery("query must not be blank".to_string()));
        }
        if request.query.chars().count() > self.config.max_query_chars {
            return Err(VectorizationError::InvalidQuery(format!(
                "query exceeds {} characters",
                self.config.max_query_chars
            )));
        }

        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(VectorizationError::InvalidQuery(format!(
                "top_k must be between 1 and {}",
                self.config.max_top_k
            )));
        }

        let threshold = request.threshold.unwrap_or(self.config.similarity_threshold);
        if threshold.is_nan() || !(0.0..=1.0).contains(&threshold) {
            return Err(VectorizationError::InvalidQuery(
                "threshold must be between 0 and 1".to_string(),
            ));
        }

        Ok((top_k, threshold))
    }

    #[instrument(skip(self, request), fields(namespace = %request.namespace))]
    pub async fn search(&self, request: SearchRequest) -> VectorizationResult<SearchResponse> {
        let started = Instant::now();
        let namespace = request.namespace;

        let (top_k, threshold) = self.validate(&request).inspect_err(|_| {
            VectorizationMetrics::record_search(namespace.as_ref(), "invalid", 0);
        })?;

        let outcome = self.execute(&request, top_k, threshold, started).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = match &outcome {
            Ok(response) if response.documents.is_empty() => "empty",
            Ok(_) => "ok",
            Err(VectorizationError::SearchUnavailable(_)) => "unavailable",
            Err(_) => "error",
        };
        VectorizationMetrics::record_search(namespace.as_ref(), status, elapsed_ms);

        outcome
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        top_k: usize,
        threshold: f32,
        started: Instant,
    ) -> VectorizationResult<SearchResponse> {
        let namespace = request.namespace;
        let io_timeout = self.config.io_timeout;

        let indexed = with_timeout("index count", io_timeout, self.store.count(namespace)).await?;
        if indexed == 0 {
            debug!("Collection is empty, skipping embedding");
            return Ok(self.response(request, vec![], 0, started));
        }

        let embedding = self
            .embedder
            .embed(&request.query)
            .await
            .map_err(|e| match e {
                VectorizationError::InputTooLong { tokens, limit } => {
                    VectorizationError::InvalidQuery(format!(
                        "query is too long for the embedding model ({tokens} tokens, limit {limit})"
                    ))
                }
                other => VectorizationError::SearchUnavailable(other.to_string()),
            })?;

        let candidates = with_timeout(
            "index query",
            io_timeout,
            self.store.query(
                namespace,
                &embedding,
                top_k.saturating_mul(self.config.overfetch_factor.max(1)),
                request.filter.clone(),
            ),
        )
        .await?;
        let candidate_count = candidates.len();

        let documents: Vec<SearchResult> = candidates
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .take(top_k)
            .map(|hit| SearchResult {
                document_id: hit.id,
                record_id: hit.record_id,
                content_text: hit.content_text,
                similarity_score: hit.score,
                metadata: request.include_metadata.then_some(hit.metadata),
            })
            .collect();

        debug!(candidates = candidate_count, returned = documents.len(), threshold, "Search complete");
        Ok(self.response(request, documents, indexed, started))
    }

    fn response(
        &self,
        request: &SearchRequest,
        documents: Vec<SearchResult>,
        indexed: u64,
        started: Instant,
    ) -> SearchResponse {
        SearchResponse {
            query: request.query.clone(),
            namespace: request.namespace,
            embedding_model: self.embedder.model_name(),
            total_documents: usize::try_from(indexed).unwrap_or(usize::MAX),
            documents,
            search_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        }
    }
}
