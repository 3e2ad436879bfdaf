use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingProvider, EmbeddingProviderType};
use crate::error::VectorizationResult;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Offline embedder based on feature hashing.
///
/// Word tokens and character trigrams are hashed into `dimension` buckets and
/// the result is L2-normalised. Vectors are non-negative, so cosine similarity
/// between two of them is always in `[0, 1]`. Texts sharing vocabulary score
/// higher, which is enough for tests and air-gapped deployments.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            vector[self.bucket(&token)] += WORD_WEIGHT;

            let padded: Vec<char> = format!("^{token}$").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&trigram)] += TRIGRAM_WEIGHT;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn bucket(&self, feature: &str) -> usize {
        let digest = Sha256::digest(feature.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.dimension as u64) as usize
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '+'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_name(&self) -> String {
        format!("feature-hashing-{}", self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> VectorizationResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn test_vectors_are_normalized() {
        let provider = HashingEmbeddingProvider::new(64);
        let v = provider.embed_text("Female patient, 34 years old, blood type O+");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(v.iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(16);
        assert!(provider.embed_text(" ,. ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_deterministic() {
        let provider = HashingEmbeddingProvider::new(128);
        assert_eq!(provider.embed_text("blood type AB-"), provider.embed_text("blood type AB-"));
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let provider = HashingEmbeddingProvider::new(256);
        let query = provider.embed_text("female patient blood type O+");
        let close = provider.embed_text("Female patient, 34 years old, blood type O+");
        let far = provider.embed_text("quarterly invoice reconciliation");

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let provider = HashingEmbeddingProvider::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors[0], provider.embed_text("alpha"));
        assert_eq!(vectors[1], provider.embed_text("beta"));
        assert!(provider.health_check().await.is_ok());
    }
}
