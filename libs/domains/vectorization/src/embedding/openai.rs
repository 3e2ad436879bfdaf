use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, EmbeddingProviderType};
use crate::config::{DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL, EmbeddingConfig};
use crate::error::{VectorizationError, VectorizationResult};

/// OpenAI-compatible embeddings endpoint configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
}

impl OpenAIConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: 1536,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String, dimension: usize) -> Self {
        self.model = model;
        self.dimension = dimension;
        self
    }

    pub fn from_embedding_config(config: &EmbeddingConfig) -> VectorizationResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| VectorizationError::Config("OPENAI_API_KEY not set".to_string()))?;

        Ok(Self::new(api_key)
            .with_base_url(config.base_url.clone())
            .with_model(config.model_name.clone(), config.dimension))
    }
}

/// OpenAI embeddings provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// text-embedding-3 models accept a reduced output dimension
    fn requested_dimensions(&self) -> Option<usize> {
        self.config
            .model
            .starts_with("text-embedding-3")
            .then_some(self.config.dimension)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// 429 and 5xx may succeed on retry, every other status is final
fn status_error(status: StatusCode, body: &str) -> VectorizationError {
    let transient = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    VectorizationError::EmbeddingProvider {
        message: format!("OpenAI API error ({status}): {body}"),
        transient,
    }
}

fn into_ordered_vectors(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> VectorizationResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(VectorizationError::EmbeddingProvider {
            message: format!("expected {expected} embeddings, got {}", data.len()),
            transient: false,
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::OpenAI
    }

    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> VectorizationResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.requested_dimensions(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| VectorizationError::EmbeddingProvider {
                    message: format!("malformed embeddings response: {e}"),
                    transient: false,
                })?;

        into_ordered_vectors(parsed.data, texts.len())
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        let response = self
            .client
            .get(format!("{}/models/{}", self.config.base_url, self.config.model))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "too long").is_transient());
    }

    #[test]
    fn test_response_is_reordered_by_index() {
        let data = vec![
            EmbeddingData { embedding: vec![2.0], index: 1 },
            EmbeddingData { embedding: vec![1.0], index: 0 },
        ];
        let vectors = into_ordered_vectors(data, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_response_count_mismatch_is_permanent() {
        let data = vec![EmbeddingData { embedding: vec![1.0], index: 0 }];
        let err = into_ordered_vectors(data, 2).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["hello".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
            dimensions: Some(512),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"][0], "hello");
        assert_eq!(json["dimensions"], 512);
    }

    #[test]
    fn test_config_from_embedding_config() {
        let mut embedding = EmbeddingConfig::default();
        assert!(OpenAIConfig::from_embedding_config(&embedding).is_err());

        embedding.api_key = Some("sk-test".into());
        embedding.base_url = "http://localhost:8089/v1/".into();
        let config = OpenAIConfig::from_embedding_config(&embedding).unwrap();
        assert_eq!(config.base_url, "http://localhost:8089/v1");
        assert_eq!(config.model, "text-embedding-3-small");

        let provider = OpenAIProvider::new(config);
        assert_eq!(provider.requested_dimensions(), Some(1536));
        assert_eq!(provider.provider_type().to_string(), "openai");
    }
}
