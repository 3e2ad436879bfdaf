//! HTTP server assembly and lifecycle

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
};
use axum_helpers::server::{
    HealthCheckFuture, ShutdownCoordinator, create_production_app_with, create_router,
    health_router, run_health_checks,
};
use core_config::AppInfo;
use domain_vectorization::VectorizationService;
use eyre::{Result, WrapErr};
use observability::{metrics_handler, metrics_middleware};
use tracing::{error, info};

use crate::config::Config;
use crate::openapi::ApiDoc;
use crate::pipeline;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Readiness: the patients database and the index store must both answer
async fn ready(State(service): State<Arc<VectorizationService>>) -> impl IntoResponse {
    let checks: Vec<(&str, HealthCheckFuture)> = vec![
        (
            "database",
            Box::pin(async { service.check_source().await.map_err(|e| e.to_string()) }),
        ),
        (
            "index",
            Box::pin(async { service.check_index().await.map_err(|e| e.to_string()) }),
        ),
    ];
    run_health_checks(checks).await
}

/// Full application router: API under `/api/vectorization`, docs, `/health`, `/ready`, `/metrics`
pub fn app_router(service: Arc<VectorizationService>, app: AppInfo) -> Result<Router> {
    let api_routes = Router::new().nest(
        "/vectorization",
        domain_vectorization::router(Arc::clone(&service)),
    );

    let router = create_router::<ApiDoc>(api_routes).wrap_err("Failed to build router")?;

    Ok(router
        .merge(health_router(app))
        .merge(
            Router::new()
                .route("/ready", get(ready))
                .with_state(service),
        )
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware)))
}

/// Serve the HTTP API until SIGINT/SIGTERM
pub async fn serve(config: Config) -> Result<()> {
    observability::init_metrics().wrap_err("Failed to install metrics recorder")?;

    let pipeline::Pipeline { service, db } = pipeline::build(&config).await?;
    let router = app_router(Arc::clone(&service), config.app)?;

    info!(
        model = %service.embedding_model(),
        "Starting medbot vectorizer with graceful shutdown ({}s timeout)",
        SHUTDOWN_TIMEOUT.as_secs()
    );

    create_production_app_with(
        router,
        &config.server,
        ShutdownCoordinator::default(),
        SHUTDOWN_TIMEOUT,
        async move {
            info!("Shutting down: cancelling syncs and flushing index");
            if let Err(e) = service.shutdown().await {
                error!(error = %e, "Failed to flush index on shutdown");
            }
            match db.close().await {
                Ok(()) => info!("PostgreSQL connection closed successfully"),
                Err(e) => error!("Error closing PostgreSQL: {}", e),
            }
        },
    )
    .await
    .wrap_err("Server error")?;

    info!("Medbot vectorizer shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain_vectorization::{
        EmbeddingClient, EmbeddingConfig, HashingEmbeddingProvider, InMemoryIndexStore,
        InMemoryRecordSource, InMemoryWatermarkStore, IndexConfig, PatientRecord,
        PipelineConfig,
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_service() -> Arc<VectorizationService> {
        let config = PipelineConfig {
            embedding: EmbeddingConfig::local(64),
            index: IndexConfig::in_memory(),
            ..PipelineConfig::default()
        };
        let source = InMemoryRecordSource::with_records([
            PatientRecord::new(1, "Laura Gomez", Utc::now()).with_age(43)
        ]);

        Arc::new(VectorizationService::new(
            Arc::new(source),
            EmbeddingClient::new(
                Arc::new(HashingEmbeddingProvider::new(64)),
                config.embedding.clone(),
            ),
            Arc::new(InMemoryIndexStore::new(&config.index)),
            Arc::new(InMemoryWatermarkStore::new()),
            config,
        ))
    }

    fn router() -> Router {
        temp_env::with_var_unset("CORS_ALLOWED_ORIGIN", || {
            app_router(test_service(), core_config::app_info!()).unwrap()
        })
    }

    async fn fetch(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_liveness_and_readiness() {
        let (status, body) = fetch(router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("medbot_vectorizer"));

        let (status, body) = fetch(router(), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"index\":\"connected\""));
    }

    #[tokio::test]
    async fn test_api_is_nested() {
        let (status, body) = fetch(router(), "/api/vectorization/collections").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("medbot_documents"));

        let (status, _) = fetch(router(), "/vectorization/collections").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_openapi_lists_prefixed_paths() {
        let (status, body) = fetch(router(), "/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/api/vectorization/search"));
        assert!(body.contains("/api/vectorization/sync/{namespace}"));
    }
}
