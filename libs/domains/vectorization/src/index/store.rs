use async_trait::async_trait;
use uuid::Uuid;

use crate::error::VectorizationResult;
use crate::models::{MetadataFilter, Namespace, ScoredDocument, VectorDocument};

/// Vector storage with one collection per namespace.
///
/// Upserts are atomic per document id. Namespaces never see each other's
/// documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndexStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn collection_name(&self, namespace: Namespace) -> String;

    /// Create the namespace collection if it does not exist yet
    async fn ensure_collection(&self, namespace: Namespace, dimension: usize)
    -> VectorizationResult<()>;

    /// Insert or overwrite by `document.id`
    async fn upsert(&self, document: VectorDocument) -> VectorizationResult<()>;

    /// Returns whether a document was removed
    async fn delete(&self, namespace: Namespace, id: Uuid) -> VectorizationResult<bool>;

    /// k nearest documents by cosine similarity, best first
    async fn query(
        &self,
        namespace: Namespace,
        embedding: &[f32],
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> VectorizationResult<Vec<ScoredDocument>>;

    async fn count(&self, namespace: Namespace) -> VectorizationResult<u64>;

    /// Source record ids that currently have a document, ascending
    async fn record_ids(&self, namespace: Namespace) -> VectorizationResult<Vec<i64>>;

    /// Drop every document in the namespace, returning how many were removed
    async fn reset(&self, namespace: Namespace) -> VectorizationResult<usize>;

    /// Persist pending state, if the backend buffers anything
    async fn flush(&self) -> VectorizationResult<()>;

    async fn health_check(&self) -> VectorizationResult<()>;
}

/// Cosine similarity clamped to `[0, 1]`. Zero vectors and mismatched
/// lengths score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_is_clamped() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
