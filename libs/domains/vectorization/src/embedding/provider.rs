use async_trait::async_trait;
use strum::{AsRefStr, Display};

use crate::error::VectorizationResult;

/// Selected with `EMBEDDING_PROVIDER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EmbeddingProviderType {
    OpenAI,
    /// Offline feature-hashing embedder
    Local,
}

/// Text to vector backend.
///
/// Implementations make a single attempt per call. Retries, timeouts and
/// input-length policy live in [`super::EmbeddingClient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn provider_type(&self) -> EmbeddingProviderType;

    fn model_name(&self) -> String;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> VectorizationResult<Vec<Vec<f32>>>;

    async fn health_check(&self) -> VectorizationResult<()>;
}
