//! Cron-driven incremental sync

use std::sync::Arc;

use axum_helpers::server::shutdown_signal;
use domain_vectorization::{VectorizationError, VectorizationService};
use eyre::{Result, WrapErr};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Sync every namespace once, logging each outcome
pub async fn sync_once(service: &VectorizationService, force: bool) {
    for (namespace, outcome) in service.sync_all(force).await {
        match outcome {
            Ok(result) => info!(
                %namespace,
                succeeded = result.succeeded,
                failed = result.failed.len(),
                deleted = result.deleted,
                watermark = ?result.watermark,
                "Scheduled sync complete"
            ),
            Err(VectorizationError::SyncInProgress(_)) => {
                warn!(%namespace, "Previous sync still running, skipping this tick")
            }
            Err(e) => error!(%namespace, error = %e, "Scheduled sync failed"),
        }
    }
}

/// Run incremental syncs on `cron_expr` until SIGINT/SIGTERM
pub async fn run_scheduled(service: Arc<VectorizationService>, cron_expr: &str) -> Result<()> {
    info!(cron = cron_expr, "Starting scheduled sync");

    let mut scheduler = JobScheduler::new().await?;

    let job_service = Arc::clone(&service);
    let job = Job::new_async(cron_expr, move |_uuid, _l| {
        let service = Arc::clone(&job_service);
        Box::pin(async move {
            sync_once(&service, false).await;
        })
    })
    .wrap_err_with(|| format!("Invalid cron expression '{cron_expr}'"))?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    // Run once at startup so a fresh deployment does not wait for the first tick
    sync_once(&service, false).await;

    shutdown_signal().await;
    info!("Stopping scheduler");

    service
        .shutdown()
        .await
        .wrap_err("Failed to flush index on shutdown")?;
    scheduler.shutdown().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain_vectorization::{
        EmbeddingClient, EmbeddingConfig, HashingEmbeddingProvider, InMemoryIndexStore,
        InMemoryRecordSource, InMemoryWatermarkStore, IndexConfig, Namespace, PatientRecord,
        PipelineConfig,
    };

    #[tokio::test]
    async fn test_sync_once_covers_every_namespace() {
        let config = PipelineConfig {
            embedding: EmbeddingConfig::local(32),
            index: IndexConfig::in_memory(),
            ..PipelineConfig::default()
        };
        let source = InMemoryRecordSource::with_records([
            PatientRecord::new(1, "Laura Gomez", Utc::now()).with_age(43),
            PatientRecord::new(2, "Pedro Diaz", Utc::now()).with_age(67),
        ]);
        let service = VectorizationService::new(
            Arc::new(source),
            EmbeddingClient::new(
                Arc::new(HashingEmbeddingProvider::new(32)),
                config.embedding.clone(),
            ),
            Arc::new(InMemoryIndexStore::new(&config.index)),
            Arc::new(InMemoryWatermarkStore::new()),
            config,
        );

        sync_once(&service, false).await;

        for namespace in [Namespace::FullProfile, Namespace::Demographic] {
            let status = service.sync_status(namespace).await.unwrap();
            assert_eq!(status.watermark.map(|w| w.last_record_id), Some(2));
        }
    }
}
