//! Patient Vectorization Domain
//!
//! Turns rows of the relational `patients` table into natural-language
//! descriptions, embeds them, keeps one vector collection per namespace in step
//! with the source, and answers semantic queries against those collections.
//!
//! # Architecture
//!
//! ```text
//!                ┌───────────────────────┐
//!                │ VectorizationService  │  ← handlers, CLI, scheduler
//!                └───────┬───────┬───────┘
//!                        │       │
//!          ┌─────────────▼──┐ ┌──▼───────────┐
//!          │SyncOrchestrator│ │ QueryService │
//!          └──┬──────┬──────┘ └──┬────────┬──┘
//!             │      │           │        │
//! ┌───────────▼┐ ┌───▼───────────▼┐ ┌─────▼────────────┐
//! │RecordSource│ │EmbeddingClient │ │ VectorIndexStore │
//! │ (Postgres) │ │ (OpenAI/local) │ │ (Qdrant/memory)  │
//! └────────────┘ └────────────────┘ └──────────────────┘
//! ```
//!
//! Each sync run pages through records with id above the namespace's watermark,
//! projects them to text, embeds them in bounded-concurrency batches and upserts
//! them under a stable document id. The watermark only moves past records whose
//! documents are stored, so failed records are retried on the next run.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_vectorization::{
//!     EmbeddingClient, HashingEmbeddingProvider, InMemoryIndexStore, InMemoryRecordSource,
//!     InMemoryWatermarkStore, Namespace, PipelineConfig, SearchRequest, VectorizationService,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let service = VectorizationService::new(
//!     Arc::new(InMemoryRecordSource::new()),
//!     EmbeddingClient::new(Arc::new(HashingEmbeddingProvider::new(384)), config.embedding.clone()),
//!     Arc::new(InMemoryIndexStore::new(&config.index)),
//!     Arc::new(InMemoryWatermarkStore::new()),
//!     config,
//! );
//!
//! service.sync(Namespace::FullProfile, false).await?;
//! let response = service.search(SearchRequest::new("patients born in July")).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod index;
pub mod models;
pub mod projector;
pub mod search;
pub mod service;
pub mod source;
pub mod sync;
pub mod watermark;

// Re-export commonly used types
pub use config::{
    ConflictPolicy, EmbeddingConfig, IndexBackend, IndexConfig, InputPolicy, PipelineConfig,
    SearchConfig, SyncConfig,
};
pub use embedding::{
    EmbeddingClient, EmbeddingProvider, EmbeddingProviderType, HashingEmbeddingProvider,
    OpenAIConfig, OpenAIProvider,
};
pub use error::{VectorizationError, VectorizationResult};
pub use handlers::{VectorizationApiDoc, router};
pub use index::{InMemoryIndexStore, QdrantIndexStore, VectorIndexStore};
pub use models::{
    CollectionSummary, HealthReport, Metadata, MetadataFilter, MetadataValue, Namespace,
    PatientRecord, PatientSummary, ResetResult, SearchRequest, SearchResponse, SearchResult,
    SyncPhase, SyncResult, SyncStatus, SyncWatermark, VectorDocument,
};
pub use search::QueryService;
pub use service::VectorizationService;
pub use source::{InMemoryRecordSource, PgPatientSource, RecordSource, SourceStats};
pub use sync::SyncOrchestrator;
pub use watermark::{FileWatermarkStore, InMemoryWatermarkStore, WatermarkStore};
