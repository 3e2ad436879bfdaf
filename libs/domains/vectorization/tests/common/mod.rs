//! Shared fixtures for the vectorization integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use domain_vectorization::*;

pub const DIMENSION: usize = 256;

/// Everything a test needs to poke at besides the service itself
pub struct Harness {
    pub service: Arc<VectorizationService>,
    pub source: Arc<InMemoryRecordSource>,
    pub store: Arc<InMemoryIndexStore>,
    pub watermarks: Arc<InMemoryWatermarkStore>,
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        embedding: EmbeddingConfig::local(DIMENSION).with_max_retries(0),
        index: IndexConfig::in_memory(),
        sync: SyncConfig::default()
            .with_page_size(3)
            .with_embed_batch_size(2)
            .with_concurrency(2),
        search: SearchConfig::default(),
    }
}

pub fn harness(records: Vec<PatientRecord>) -> Harness {
    harness_with(records, Arc::new(HashingEmbeddingProvider::new(DIMENSION)), pipeline_config())
}

pub fn harness_with(
    records: Vec<PatientRecord>,
    provider: Arc<dyn EmbeddingProvider>,
    config: PipelineConfig,
) -> Harness {
    let source = Arc::new(InMemoryRecordSource::with_records(records));
    let store = Arc::new(InMemoryIndexStore::new(&config.index));
    let watermarks = Arc::new(InMemoryWatermarkStore::new());

    let service = VectorizationService::new(
        source.clone(),
        EmbeddingClient::new(provider, config.embedding.clone()),
        store.clone(),
        watermarks.clone(),
        config,
    );

    Harness {
        service: Arc::new(service),
        source,
        store,
        watermarks,
    }
}

fn registered() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

pub fn patient(id: i64, name: &str, age: u32) -> PatientRecord {
    PatientRecord::new(id, name, registered()).with_age(age)
}

/// Five patients with a mix of demographics and contact details
pub fn sample_patients() -> Vec<PatientRecord> {
    vec![
        patient(1, "Laura Gomez", 43)
            .with_gender("F")
            .with_blood_type("A+")
            .with_birth_date(NaiveDate::from_ymd_opt(1980, 7, 20).unwrap())
            .with_email("laura@example.com"),
        patient(2, "Pedro Diaz", 67)
            .with_gender("M")
            .with_blood_type("O-")
            .with_phone("555-0102"),
        patient(3, "Ana Torres", 29)
            .with_gender("F")
            .with_blood_type("B+")
            .with_identification("CC-3003"),
        patient(4, "Carlos Ruiz", 52).with_gender("M").with_blood_type("A+"),
        patient(5, "Maria Lopez", 35)
            .with_gender("F")
            .with_blood_type("AB+")
            .with_email("maria@example.com")
            .with_phone("555-0105"),
    ]
}

/// Hashing embedder that sleeps before every call
pub struct SlowProvider {
    inner: HashingEmbeddingProvider,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(DIMENSION),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_name(&self) -> String {
        "slow-hashing".to_string()
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed_batch(&self, texts: &[String]) -> VectorizationResult<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        Ok(())
    }
}

/// Hashing embedder that rejects any batch containing `poison`
pub struct PoisonProvider {
    inner: HashingEmbeddingProvider,
    poison: String,
}

impl PoisonProvider {
    pub fn new(poison: impl Into<String>) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(DIMENSION),
            poison: poison.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for PoisonProvider {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_name(&self) -> String {
        "poison-hashing".to_string()
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed_batch(&self, texts: &[String]) -> VectorizationResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(&self.poison)) {
            return Err(VectorizationError::EmbeddingProvider {
                message: format!("rejected input containing '{}'", self.poison),
                transient: false,
            });
        }
        self.inner.embed_batch(texts).await
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        Err(VectorizationError::EmbeddingProvider {
            message: "health endpoint disabled".to_string(),
            transient: false,
        })
    }
}
