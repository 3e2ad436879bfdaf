use std::sync::Arc;
use std::time::Duration;

use database::common::retry_with_backoff_if;
use observability::VectorizationMetrics;
use tracing::{debug, instrument, warn};

use super::EmbeddingProvider;
use crate::config::{EmbeddingConfig, InputPolicy};
use crate::error::{VectorizationError, VectorizationResult, with_timeout};

/// Characters per token used to approximate input length
const CHARS_PER_TOKEN: usize = 4;

/// Provider wrapper adding input limits, per-call timeouts, retries and
/// output validation. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbeddingConfig) -> Self {
        Self { provider, config }
    }

    pub fn model_name(&self) -> String {
        self.provider.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Apply the input-length policy to `text`
    pub fn prepare_input(&self, text: &str) -> VectorizationResult<String> {
        let max_chars = self.config.max_input_tokens.saturating_mul(CHARS_PER_TOKEN);
        let char_count = text.chars().count();
        if char_count <= max_chars {
            return Ok(text.to_string());
        }

        match self.config.input_policy {
            InputPolicy::Truncate => {
                debug!(chars = char_count, max_chars, "Truncating embedding input");
                Ok(text.chars().take(max_chars).collect())
            }
            InputPolicy::Reject => Err(VectorizationError::InputTooLong {
                tokens: char_count.div_ceil(CHARS_PER_TOKEN),
                limit: self.config.max_input_tokens,
            }),
        }
    }

    pub async fn embed(&self, text: &str) -> VectorizationResult<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            VectorizationError::Internal("embedding provider returned no vector".to_string())
        })
    }

    /// Embed `texts` in one provider call, retrying transient failures
    #[instrument(skip(self, texts), fields(provider = %self.provider.provider_type(), inputs = texts.len()))]
    pub async fn embed_many(&self, texts: &[String]) -> VectorizationResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let inputs = texts
            .iter()
            .map(|t| self.prepare_input(t))
            .collect::<VectorizationResult<Vec<_>>>()?;

        let provider_name = self.provider.provider_type().to_string();
        let expected_dimension = self.provider.dimension();
        let timeout = self.config.timeout;
        let mut attempts = 0u32;

        let result = retry_with_backoff_if(
            || {
                attempts += 1;
                let provider = &self.provider;
                let inputs = &inputs;
                async move {
                    let vectors = with_timeout(
                        "embedding call",
                        timeout,
                        provider.embed_batch(inputs),
                    )
                    .await?;
                    validate_output(&vectors, inputs.len(), expected_dimension)?;
                    Ok(vectors)
                }
            },
            self.config.retry_config(),
            |err: &VectorizationError| {
                let retry = err.is_transient();
                if retry {
                    VectorizationMetrics::record_embedding_retry(&provider_name);
                }
                retry
            },
        )
        .await;

        match result {
            Ok(vectors) => {
                VectorizationMetrics::record_embedding_call(&provider_name, "ok", inputs.len());
                Ok(vectors)
            }
            Err(err) => {
                VectorizationMetrics::record_embedding_call(&provider_name, "error", inputs.len());
                warn!(attempts, error = %err, "Embedding failed");
                Err(VectorizationError::EmbeddingUnavailable {
                    attempts,
                    message: err.to_string(),
                })
            }
        }
    }

    pub async fn health_check(&self) -> VectorizationResult<()> {
        with_timeout(
            "embedding health check",
            self.config.timeout,
            self.provider.health_check(),
        )
        .await
    }
}

fn validate_output(
    vectors: &[Vec<f32>],
    expected_count: usize,
    expected_dimension: usize,
) -> VectorizationResult<()> {
    if vectors.len() != expected_count {
        return Err(VectorizationError::EmbeddingProvider {
            message: format!("expected {expected_count} vectors, got {}", vectors.len()),
            transient: false,
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dimension) {
        return Err(VectorizationError::EmbeddingProvider {
            message: format!(
                "dimension mismatch: expected {expected_dimension}, got {}",
                bad.len()
            ),
            transient: false,
        });
    }
    Ok(())
}
