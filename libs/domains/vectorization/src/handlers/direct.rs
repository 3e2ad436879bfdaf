//! REST handlers for search, sync and index maintenance

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::error::{VectorizationError, VectorizationResult};
use crate::models::{
    CollectionSummary, HealthReport, Namespace, PatientSummary, ResetResult, SearchRequest,
    SearchResponse, SyncRequest, SyncResult, SyncStatus,
};
use crate::service::VectorizationService;

fn parse_namespace(raw: &str) -> VectorizationResult<Namespace> {
    Namespace::from_str(raw).map_err(|_| {
        VectorizationError::InvalidQuery(format!(
            "unknown namespace '{raw}', expected 'full_profile' or 'demographic'"
        ))
    })
}

/// Semantic search over a namespace
#[utoipa::path(
    post,
    path = "/search",
    tag = "vectorization",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked matches", body = SearchResponse),
        (status = 400, description = "Invalid query"),
        (status = 503, description = "Embedding provider unavailable"),
        (status = 504, description = "Index timed out")
    )
)]
pub async fn search(
    State(service): State<Arc<VectorizationService>>,
    Json(request): Json<SearchRequest>,
) -> VectorizationResult<Json<SearchResponse>> {
    let response = service.search(request).await?;
    Ok(Json(response))
}

/// Run an incremental (or forced) sync for a namespace
#[utoipa::path(
    post,
    path = "/sync/{namespace}",
    tag = "vectorization",
    params(
        ("namespace" = String, Path, description = "full_profile or demographic")
    ),
    request_body(content = SyncRequest, description = "Optional; set force to re-vectorize every record"),
    responses(
        (status = 200, description = "Sync finished", body = SyncResult),
        (status = 400, description = "Unknown namespace"),
        (status = 409, description = "A sync is already running for this namespace"),
        (status = 503, description = "Source unavailable")
    )
)]
pub async fn trigger_sync(
    State(service): State<Arc<VectorizationService>>,
    Path(namespace): Path<String>,
    request: Option<Json<SyncRequest>>,
) -> VectorizationResult<Json<SyncResult>> {
    let namespace = parse_namespace(&namespace)?;
    let force = request.is_some_and(|Json(r)| r.force);

    let result = service.sync(namespace, force).await?;
    Ok(Json(result))
}

/// Current phase, watermark and last result for a namespace
#[utoipa::path(
    get,
    path = "/sync/{namespace}",
    tag = "vectorization",
    params(
        ("namespace" = String, Path, description = "full_profile or demographic")
    ),
    responses(
        (status = 200, description = "Sync status", body = SyncStatus),
        (status = 400, description = "Unknown namespace")
    )
)]
pub async fn sync_status(
    State(service): State<Arc<VectorizationService>>,
    Path(namespace): Path<String>,
) -> VectorizationResult<Json<SyncStatus>> {
    let namespace = parse_namespace(&namespace)?;
    Ok(Json(service.sync_status(namespace).await?))
}

/// Component health of the pipeline
#[utoipa::path(
    get,
    path = "/health",
    tag = "vectorization",
    responses(
        (status = 200, description = "All components reachable", body = HealthReport),
        (status = 503, description = "At least one component is down", body = HealthReport)
    )
)]
pub async fn health(State(service): State<Arc<VectorizationService>>) -> impl IntoResponse {
    let report = service.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// Indexed collections with document counts
#[utoipa::path(
    get,
    path = "/collections",
    tag = "vectorization",
    responses(
        (status = 200, description = "Collections", body = Vec<CollectionSummary>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_collections(
    State(service): State<Arc<VectorizationService>>,
) -> VectorizationResult<Json<Vec<CollectionSummary>>> {
    Ok(Json(service.collections().await?))
}

/// Drop a namespace's documents and watermark so the next sync rebuilds it
#[utoipa::path(
    delete,
    path = "/collections/{namespace}",
    tag = "vectorization",
    params(
        ("namespace" = String, Path, description = "full_profile or demographic")
    ),
    responses(
        (status = 200, description = "Namespace reset", body = ResetResult),
        (status = 400, description = "Unknown namespace"),
        (status = 409, description = "A sync is running for this namespace")
    )
)]
pub async fn reset_collection(
    State(service): State<Arc<VectorizationService>>,
    Path(namespace): Path<String>,
) -> VectorizationResult<Json<ResetResult>> {
    let namespace = parse_namespace(&namespace)?;
    Ok(Json(service.reset_namespace(namespace).await?))
}

/// Patient counts and sample descriptions
#[utoipa::path(
    get,
    path = "/patients/summary",
    tag = "vectorization",
    responses(
        (status = 200, description = "Patient summary", body = PatientSummary),
        (status = 503, description = "Source unavailable")
    )
)]
pub async fn patient_summary(
    State(service): State<Arc<VectorizationService>>,
) -> VectorizationResult<Json<PatientSummary>> {
    Ok(Json(service.patient_summary().await?))
}
