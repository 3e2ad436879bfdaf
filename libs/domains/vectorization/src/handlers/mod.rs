mod direct;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use utoipa::OpenApi;

use crate::models::{
    CollectionSummary, FailureStage, HealthReport, MetadataFilter, Namespace, PatientSummary,
    RecordFailure, ResetResult, SearchRequest, SearchResponse, SearchResult, SyncPhase,
    SyncRequest, SyncResult, SyncStatus, SyncWatermark,
};
use crate::service::VectorizationService;

/// OpenAPI documentation for the vectorization API
#[derive(OpenApi)]
#[openapi(
    paths(
        direct::search,
        direct::trigger_sync,
        direct::sync_status,
        direct::health,
        direct::list_collections,
        direct::reset_collection,
        direct::patient_summary,
    ),
    components(
        schemas(
            Namespace, MetadataFilter,
            SearchRequest, SearchResponse, SearchResult,
            SyncRequest, SyncResult, SyncStatus, SyncPhase, SyncWatermark,
            FailureStage, RecordFailure,
            HealthReport, CollectionSummary, ResetResult, PatientSummary
        )
    ),
    tags(
        (name = "vectorization", description = "Patient vectorization and semantic search")
    )
)]
pub struct VectorizationApiDoc;

/// Create router for the vectorization handlers
pub fn router(service: Arc<VectorizationService>) -> Router {
    Router::new()
        .route("/search", post(direct::search))
        .route(
            "/sync/{namespace}",
            post(direct::trigger_sync).get(direct::sync_status),
        )
        .route("/health", get(direct::health))
        .route("/collections", get(direct::list_collections))
        .route("/collections/{namespace}", delete(direct::reset_collection))
        .route("/patients/summary", get(direct::patient_summary))
        .with_state(service)
}
