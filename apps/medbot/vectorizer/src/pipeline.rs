//! Adapter selection and service assembly

use std::sync::Arc;

use domain_vectorization::{
    EmbeddingClient, EmbeddingConfig, EmbeddingProvider, EmbeddingProviderType,
    FileWatermarkStore, HashingEmbeddingProvider, InMemoryIndexStore, IndexBackend, IndexConfig,
    OpenAIConfig, OpenAIProvider, PgPatientSource, QdrantIndexStore, VectorIndexStore,
    VectorizationService,
};
use eyre::{Result, WrapErr};
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::config::Config;

/// Assembled service plus the handles that need closing on shutdown
pub struct Pipeline {
    pub service: Arc<VectorizationService>,
    pub db: DatabaseConnection,
}

pub fn embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderType::OpenAI => {
            let openai = OpenAIConfig::from_embedding_config(config)
                .wrap_err("Invalid OpenAI embedding configuration")?;
            info!(model = %config.model_name, dimension = config.dimension, "Using OpenAI embeddings");
            Ok(Arc::new(OpenAIProvider::new(openai)))
        }
        EmbeddingProviderType::Local => {
            info!(dimension = config.dimension, "Using local feature-hashing embeddings");
            Ok(Arc::new(HashingEmbeddingProvider::new(config.dimension)))
        }
    }
}

pub async fn index_store(config: &IndexConfig) -> Result<Arc<dyn VectorIndexStore>> {
    match &config.backend {
        IndexBackend::Memory {
            storage_path: Some(path),
        } => {
            info!(path = %path.display(), "Using embedded index store");
            let store = InMemoryIndexStore::open(config, path)
                .await
                .wrap_err_with(|| format!("Failed to open index at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        IndexBackend::Memory { storage_path: None } => {
            info!("Using volatile in-memory index store");
            Ok(Arc::new(InMemoryIndexStore::new(config)))
        }
        IndexBackend::Qdrant {
            url,
            api_key,
            timeout_secs,
        } => {
            info!(%url, "Using Qdrant index store");
            let store = QdrantIndexStore::new(url, api_key.clone(), *timeout_secs, config)
                .wrap_err("Failed to create Qdrant client")?;
            Ok(Arc::new(store))
        }
    }
}

/// Connect to every backend and build the service
pub async fn build(config: &Config) -> Result<Pipeline> {
    info!("Connecting to patients database...");
    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .wrap_err("PostgreSQL connection failed")?;

    let provider = embedding_provider(&config.pipeline.embedding)?;
    let store = index_store(&config.pipeline.index).await?;
    let watermarks = FileWatermarkStore::open(&config.watermark_path)
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to open watermark store at {}",
                config.watermark_path.display()
            )
        })?;

    let service = VectorizationService::new(
        Arc::new(PgPatientSource::new(db.clone())),
        EmbeddingClient::new(provider, config.pipeline.embedding.clone()),
        store,
        Arc::new(watermarks),
        config.pipeline.clone(),
    );

    Ok(Pipeline {
        service: Arc::new(service),
        db,
    })
}
