use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{VectorizationResult, with_timeout};
use crate::index::VectorIndexStore;
use crate::models::{
    CollectionSummary, HealthReport, Namespace, PatientSummary, ResetResult, SearchRequest,
    SearchResponse, SyncResult, SyncStatus,
};
use crate::projector;
use crate::search::QueryService;
use crate::source::RecordSource;
use crate::sync::SyncOrchestrator;
use crate::watermark::WatermarkStore;

const SUMMARY_SAMPLE_SIZE: u64 = 3;

/// Entry point for handlers, the CLI and the scheduler.
///
/// Owns the sync orchestrator and the query service, which share one embedding
/// client and one index store.
pub struct VectorizationService {
    source: Arc<dyn RecordSource>,
    embedder: EmbeddingClient,
    store: Arc<dyn VectorIndexStore>,
    sync: SyncOrchestrator,
    query: QueryService,
    config: PipelineConfig,
}

impl VectorizationService {
    pub fn new(
        source: Arc<dyn RecordSource>,
        embedder: EmbeddingClient,
        store: Arc<dyn VectorIndexStore>,
        watermarks: Arc<dyn WatermarkStore>,
        config: PipelineConfig,
    ) -> Self {
        let sync = SyncOrchestrator::new(
            source.clone(),
            embedder.clone(),
            store.clone(),
            watermarks,
            config.sync.clone(),
        );
        let query = QueryService::new(embedder.clone(), store.clone(), config.search.clone());

        Self {
            source,
            embedder,
            store,
            sync,
            query,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn embedding_model(&self) -> String {
        self.embedder.model_name()
    }

    pub async fn search(&self, request: SearchRequest) -> VectorizationResult<SearchResponse> {
        self.query.search(request).await
    }

    pub async fn sync(&self, namespace: Namespace, force: bool) -> VectorizationResult<SyncResult> {
        self.sync.run(namespace, force).await
    }

    pub async fn sync_with_cancel(
        &self,
        namespace: Namespace,
        force: bool,
        cancel: watch::Receiver<bool>,
    ) -> VectorizationResult<SyncResult> {
        self.sync.run_with_cancel(namespace, force, cancel).await
    }

    /// Sync every namespace in order, collecting each outcome
    pub async fn sync_all(&self, force: bool) -> Vec<(Namespace, VectorizationResult<SyncResult>)> {
        let mut outcomes = Vec::new();
        for namespace in Namespace::iter() {
            outcomes.push((namespace, self.sync.run(namespace, force).await));
        }
        outcomes
    }

    pub async fn sync_status(&self, namespace: Namespace) -> VectorizationResult<SyncStatus> {
        self.sync.status(namespace).await
    }

    pub async fn reset_namespace(&self, namespace: Namespace) -> VectorizationResult<ResetResult> {
        self.sync.reset(namespace).await
    }

    /// Probe the source, the embedding provider and the index store
    #[instrument(skip(self))]
    pub async fn health(&self) -> HealthReport {
        let io_timeout = self.config.sync.io_timeout;

        let adapter = with_timeout("source health", io_timeout, self.source.health_check()).await;
        let embedding = with_timeout(
            "embedding health",
            self.embedder.timeout(),
            self.embedder.health_check(),
        )
        .await;
        let index = with_timeout("index health", io_timeout, self.store.health_check()).await;

        for (component, outcome) in [("source", &adapter), ("embedding", &embedding), ("index", &index)] {
            if let Err(e) = outcome {
                warn!(component, error = %e, "Health check failed");
            }
        }

        let total_patients = if adapter.is_ok() {
            with_timeout("source stats", io_timeout, self.source.stats())
                .await
                .ok()
                .map(|s| s.total)
        } else {
            None
        };

        HealthReport {
            adapter_ok: adapter.is_ok(),
            embedding_ok: embedding.is_ok(),
            index_ok: index.is_ok(),
            total_patients,
        }
    }

    /// Document counts and watermarks for every namespace
    pub async fn collections(&self) -> VectorizationResult<Vec<CollectionSummary>> {
        let io_timeout = self.config.sync.io_timeout;
        let mut summaries = Vec::new();

        for namespace in Namespace::iter() {
            let documents =
                with_timeout("index count", io_timeout, self.store.count(namespace)).await?;
            summaries.push(CollectionSummary {
                namespace,
                collection_name: self.store.collection_name(namespace),
                documents,
                watermark: self.sync.watermark(namespace).await?,
            });
        }

        Ok(summaries)
    }

    /// Patient counts plus a few sample full-profile descriptions
    #[instrument(skip(self))]
    pub async fn patient_summary(&self) -> VectorizationResult<PatientSummary> {
        let io_timeout = self.config.sync.io_timeout;

        let stats = with_timeout("source stats", io_timeout, self.source.stats()).await?;
        let sample = with_timeout(
            "source fetch",
            io_timeout,
            self.source.fetch_after(None, SUMMARY_SAMPLE_SIZE),
        )
        .await?;

        let sample_descriptions = sample
            .iter()
            .filter_map(|record| projector::project(record, Namespace::FullProfile).ok())
            .collect();

        Ok(PatientSummary {
            total_patients: stats.total,
            patients_with_email: stats.with_email,
            patients_with_phone: stats.with_phone,
            sample_descriptions,
        })
    }

    pub async fn check_source(&self) -> VectorizationResult<()> {
        with_timeout("source health", self.config.sync.io_timeout, self.source.health_check()).await
    }

    pub async fn check_index(&self) -> VectorizationResult<()> {
        with_timeout("index health", self.config.sync.io_timeout, self.store.health_check()).await
    }

    /// Cancel in-flight syncs and persist the index
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> VectorizationResult<()> {
        self.sync.shutdown();
        with_timeout("index flush", self.config.sync.io_timeout, self.store.flush()).await?;
        info!("Vectorization service stopped");
        Ok(())
    }
}
