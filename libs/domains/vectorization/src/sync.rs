//! Incremental sync from the record source into the vector index.
//!
//! One run per namespace at a time. A run pages through records above the
//! stored watermark, projects each one, embeds in chunks on a bounded pool and
//! upserts the results. Per-record failures are collected and never stop the
//! run. The watermark only advances over the contiguous prefix of scanned ids
//! that all succeeded, so a failed record is picked up again next time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use database::common::retry_with_backoff_if;
use observability::VectorizationMetrics;
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, MutexGuard, RwLock, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConflictPolicy, SyncConfig};
use crate::embedding::EmbeddingClient;
use crate::error::{VectorizationError, VectorizationResult, with_timeout};
use crate::index::VectorIndexStore;
use crate::models::{
    FailureStage, Namespace, PatientRecord, RecordFailure, ResetResult, SyncPhase, SyncResult,
    SyncStatus, SyncWatermark, VectorDocument,
};
use crate::projector;
use crate::source::RecordSource;
use crate::watermark::WatermarkStore;

#[derive(Default)]
struct SlotState {
    phase: SyncPhase,
    running: bool,
    last_result: Option<SyncResult>,
}

/// Per-namespace run lock and observable state
#[derive(Default)]
struct NamespaceSlot {
    run_lock: Mutex<()>,
    state: RwLock<SlotState>,
}

struct Projected {
    record: PatientRecord,
    text: String,
}

struct Embedded {
    record: PatientRecord,
    text: String,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct RunTally {
    /// Every id read from the source this run, ascending
    scanned: Vec<i64>,
    succeeded: BTreeSet<i64>,
    failures: Vec<RecordFailure>,
}

impl RunTally {
    fn fail(&mut self, namespace: Namespace, record_id: i64, stage: FailureStage, err: &VectorizationError) {
        warn!(%namespace, record_id, %stage, error = %err, "Record failed");
        self.failures.push(RecordFailure {
            record_id,
            stage,
            message: err.to_string(),
        });
    }

    /// Highest scanned id such that it and every scanned id below it succeeded
    fn contiguous_prefix(&self) -> Option<i64> {
        self.scanned
            .iter()
            .take_while(|id| self.succeeded.contains(*id))
            .last()
            .copied()
    }
}

pub struct SyncOrchestrator {
    source: Arc<dyn RecordSource>,
    embedder: EmbeddingClient,
    store: Arc<dyn VectorIndexStore>,
    watermarks: Arc<dyn WatermarkStore>,
    config: SyncConfig,
    slots: HashMap<Namespace, Arc<NamespaceSlot>>,
    shutdown: watch::Sender<bool>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        embedder: EmbeddingClient,
        store: Arc<dyn VectorIndexStore>,
        watermarks: Arc<dyn WatermarkStore>,
        config: SyncConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            embedder,
            store,
            watermarks,
            config,
            slots: Namespace::iter()
                .map(|ns| (ns, Arc::new(NamespaceSlot::default())))
                .collect(),
            shutdown,
        }
    }

    fn slot(&self, namespace: Namespace) -> VectorizationResult<Arc<NamespaceSlot>> {
        self.slots
            .get(&namespace)
            .cloned()
            .ok_or_else(|| VectorizationError::Internal(format!("no sync slot for '{namespace}'")))
    }

    /// Cancel in-flight runs. Runs started afterwards are cancelled immediately.
    pub fn shutdown(&self) {
        info!("Cancelling sync runs");
        self.shutdown.send_replace(true);
    }

    async fn acquire<'a>(
        &self,
        namespace: Namespace,
        slot: &'a NamespaceSlot,
    ) -> VectorizationResult<MutexGuard<'a, ()>> {
        match self.config.conflict_policy {
            ConflictPolicy::Reject => slot.run_lock.try_lock().map_err(|_| {
                VectorizationMetrics::record_sync_conflict(namespace.as_ref());
                VectorizationError::SyncInProgress(namespace)
            }),
            ConflictPolicy::Wait => Ok(slot.run_lock.lock().await),
        }
    }

    async fn set_phase(slot: &NamespaceSlot, phase: SyncPhase) {
        slot.state.write().await.phase = phase;
    }

    /// Run a sync, cancelled by [`Self::shutdown`]
    pub async fn run(&self, namespace: Namespace, force: bool) -> VectorizationResult<SyncResult> {
        self.run_with_cancel(namespace, force, self.shutdown.subscribe())
            .await
    }

    /// Run a sync that stops early once `cancel` turns `true`
    #[instrument(skip(self, cancel), fields(namespace = %namespace))]
    pub async fn run_with_cancel(
        &self,
        namespace: Namespace,
        force: bool,
        mut cancel: watch::Receiver<bool>,
    ) -> VectorizationResult<SyncResult> {
        let slot = self.slot(namespace)?;
        let _guard = self.acquire(namespace, &slot).await?;

        {
            let mut state = slot.state.write().await;
            state.running = true;
            state.phase = SyncPhase::Scanning;
        }
        info!(force, "Sync started");

        let outcome = self.execute(namespace, force, &slot, &mut cancel).await;

        let mut state = slot.state.write().await;
        state.running = false;
        state.phase = SyncPhase::Idle;
        match &outcome {
            Ok(result) => {
                info!(
                    attempted = result.attempted,
                    succeeded = result.succeeded,
                    failed = result.failed.len(),
                    deleted = result.deleted,
                    watermark = ?result.watermark,
                    cancelled = result.cancelled,
                    duration_ms = result.duration_ms,
                    "Sync finished"
                );
                state.last_result = Some(result.clone());
            }
            Err(err) => warn!(error = %err, "Sync aborted"),
        }

        outcome
    }

    async fn execute(
        &self,
        namespace: Namespace,
        force: bool,
        slot: &NamespaceSlot,
        cancel: &mut watch::Receiver<bool>,
    ) -> VectorizationResult<SyncResult> {
        let started = Instant::now();
        let io_timeout = self.config.io_timeout;

        let previous = self.watermarks.load(namespace).await?;
        let mut cursor = if force {
            None
        } else {
            previous.as_ref().map(|w| w.last_record_id)
        };

        with_timeout(
            "index ensure_collection",
            io_timeout,
            self.store.ensure_collection(namespace, self.embedder.dimension()),
        )
        .await?;

        let mut tally = RunTally::default();
        let mut cancelled = *cancel.borrow();

        while !cancelled {
            Self::set_phase(slot, SyncPhase::Scanning).await;
            let page = with_timeout(
                "source fetch",
                io_timeout,
                self.source.fetch_after(cursor, self.config.page_size),
            )
            .await?;

            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id);
            let full_page = page.len() as u64 >= self.config.page_size;
            debug!(rows = page.len(), ?cursor, "Scanned page");

            Self::set_phase(slot, SyncPhase::Projecting).await;
            let projected = self.project_page(namespace, page, &mut tally);

            Self::set_phase(slot, SyncPhase::Embedding).await;
            let (embedded, stopped) = self.embed_stage(namespace, projected, &mut tally, cancel).await;
            if stopped {
                cancelled = true;
                break;
            }

            Self::set_phase(slot, SyncPhase::Upserting).await;
            let stopped = self.upsert_stage(namespace, embedded, &mut tally, cancel).await;
            if stopped {
                cancelled = true;
                break;
            }

            if !full_page {
                break;
            }
        }

        let deleted = if self.config.prune_deleted && !cancelled {
            self.prune_deleted(namespace).await?
        } else {
            0
        };

        with_timeout("index flush", io_timeout, self.store.flush()).await?;

        let watermark = self.advance_watermark(namespace, force, previous, &tally).await?;

        let mut failed: Vec<i64> = tally.failures.iter().map(|f| f.record_id).collect();
        failed.sort_unstable();
        failed.dedup();

        let result = SyncResult {
            namespace,
            attempted: tally.scanned.len(),
            succeeded: tally.succeeded.len(),
            failed,
            failures: tally.failures,
            deleted,
            watermark,
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
        };

        VectorizationMetrics::record_sync_run(
            namespace.as_ref(),
            result.succeeded,
            result.failed.len(),
            result.deleted,
            result.cancelled,
            result.duration_ms,
        );
        if let Ok(count) = self.store.count(namespace).await {
            VectorizationMetrics::set_index_documents(namespace.as_ref(), count as usize);
        }

        Ok(result)
    }

    fn project_page(
        &self,
        namespace: Namespace,
        page: Vec<PatientRecord>,
        tally: &mut RunTally,
    ) -> Vec<Projected> {
        let mut projected = Vec::with_capacity(page.len());
        for record in page {
            tally.scanned.push(record.id);
            match projector::project(&record, namespace) {
                Ok(text) => projected.push(Projected { record, text }),
                Err(err) => tally.fail(namespace, record.id, FailureStage::Projection, &err),
            }
        }
        projected
    }

    /// Embed in chunks on the bounded pool. Returns `true` when cancelled.
    async fn embed_stage(
        &self,
        namespace: Namespace,
        projected: Vec<Projected>,
        tally: &mut RunTally,
        cancel: &mut watch::Receiver<bool>,
    ) -> (Vec<Embedded>, bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        let mut remaining = projected.into_iter();
        loop {
            let chunk: Vec<Projected> = remaining.by_ref().take(self.config.embed_batch_size.max(1)).collect();
            if chunk.is_empty() {
                break;
            }
            let semaphore = Arc::clone(&semaphore);
            let embedder = self.embedder.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                embed_chunk(&embedder, chunk).await
            });
        }

        let (chunks, cancelled) = drain(tasks, cancel).await;

        let mut embedded = Vec::new();
        for (item, outcome) in chunks.into_iter().flatten() {
            match outcome {
                Ok(embedding) => embedded.push(Embedded {
                    record: item.record,
                    text: item.text,
                    embedding,
                }),
                Err(err) => tally.fail(namespace, item.record.id, FailureStage::Embedding, &err),
            }
        }
        (embedded, cancelled)
    }

    /// Upsert documents on the bounded pool. Returns `true` when cancelled.
    async fn upsert_stage(
        &self,
        namespace: Namespace,
        embedded: Vec<Embedded>,
        tally: &mut RunTally,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let vectorized_at = Utc::now();

        for item in embedded {
            let document = VectorDocument {
                id: VectorDocument::document_id(namespace, item.record.id),
                namespace,
                record_id: item.record.id,
                metadata: projector::metadata(&item.record, namespace, &item.text, vectorized_at),
                content_text: item.text,
                embedding: item.embedding,
                vectorized_at,
            };

            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let retry = self.config.upsert_retry.clone();
            let io_timeout = self.config.io_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                let record_id = document.record_id;
                let outcome = retry_with_backoff_if(
                    || with_timeout("index upsert", io_timeout, store.upsert(document.clone())),
                    retry,
                    VectorizationError::is_transient,
                )
                .await;
                (record_id, outcome)
            });
        }

        let (outcomes, cancelled) = drain(tasks, cancel).await;
        for (record_id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    tally.succeeded.insert(record_id);
                }
                Err(err) => tally.fail(namespace, record_id, FailureStage::Upsert, &err),
            }
        }
        cancelled
    }

    /// Delete documents whose record no longer exists in the source
    async fn prune_deleted(&self, namespace: Namespace) -> VectorizationResult<usize> {
        let io_timeout = self.config.io_timeout;
        let source_ids: HashSet<i64> =
            with_timeout("source ids", io_timeout, self.source.all_ids())
                .await?
                .into_iter()
                .collect();
        let indexed = with_timeout("index record ids", io_timeout, self.store.record_ids(namespace)).await?;

        let mut deleted = 0;
        for record_id in indexed.into_iter().filter(|id| !source_ids.contains(id)) {
            let id = VectorDocument::document_id(namespace, record_id);
            if with_timeout("index delete", io_timeout, self.store.delete(namespace, id)).await? {
                debug!(%namespace, record_id, "Pruned tombstoned record");
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn advance_watermark(
        &self,
        namespace: Namespace,
        force: bool,
        previous: Option<SyncWatermark>,
        tally: &RunTally,
    ) -> VectorizationResult<Option<i64>> {
        let previous_id = previous.map(|w| w.last_record_id);
        let prefix = tally.contiguous_prefix();

        let next = if force {
            prefix
        } else {
            match (previous_id, prefix) {
                (Some(prev), Some(new)) => Some(prev.max(new)),
                (prev, new) => prev.or(new),
            }
        };

        if next == previous_id {
            return Ok(next);
        }

        match next {
            Some(last_record_id) => {
                self.watermarks
                    .save(SyncWatermark {
                        namespace,
                        last_record_id,
                        updated_at: Utc::now(),
                    })
                    .await?;
                VectorizationMetrics::set_watermark(namespace.as_ref(), last_record_id);
            }
            None => self.watermarks.clear(namespace).await?,
        }
        Ok(next)
    }

    pub async fn status(&self, namespace: Namespace) -> VectorizationResult<SyncStatus> {
        let slot = self.slot(namespace)?;
        let watermark = self.watermarks.load(namespace).await?;
        let state = slot.state.read().await;

        Ok(SyncStatus {
            namespace,
            phase: state.phase,
            running: state.running,
            watermark,
            last_result: state.last_result.clone(),
        })
    }

    pub async fn watermark(&self, namespace: Namespace) -> VectorizationResult<Option<i64>> {
        Ok(self
            .watermarks
            .load(namespace)
            .await?
            .map(|w| w.last_record_id))
    }

    /// Drop the namespace's documents and watermark. Serialised with sync runs.
    #[instrument(skip(self), fields(namespace = %namespace))]
    pub async fn reset(&self, namespace: Namespace) -> VectorizationResult<ResetResult> {
        let slot = self.slot(namespace)?;
        let _guard = self.acquire(namespace, &slot).await?;

        let documents_removed = with_timeout(
            "index reset",
            self.config.io_timeout,
            self.store.reset(namespace),
        )
        .await?;
        self.watermarks.clear(namespace).await?;
        with_timeout("index flush", self.config.io_timeout, self.store.flush()).await?;

        slot.state.write().await.last_result = None;
        VectorizationMetrics::set_index_documents(namespace.as_ref(), 0);
        info!(documents_removed, "Namespace reset");

        Ok(ResetResult {
            namespace,
            documents_removed,
        })
    }
}

async fn embed_chunk(
    embedder: &EmbeddingClient,
    chunk: Vec<Projected>,
) -> Vec<(Projected, VectorizationResult<Vec<f32>>)> {
    let texts: Vec<String> = chunk.iter().map(|p| p.text.clone()).collect();

    match embedder.embed_many(&texts).await {
        Ok(vectors) => chunk.into_iter().zip(vectors.into_iter().map(Ok)).collect(),
        Err(err) if chunk.len() == 1 => chunk
            .into_iter()
            .next()
            .map(|item| vec![(item, Err(err))])
            .unwrap_or_default(),
        Err(err) => {
            debug!(error = %err, size = chunk.len(), "Chunk embedding failed, retrying per record");
            let mut outcomes = Vec::with_capacity(chunk.len());
            for item in chunk {
                let outcome = embedder.embed(&item.text).await;
                outcomes.push((item, outcome));
            }
            outcomes
        }
    }
}

/// Collect task results until the set is empty or `cancel` fires.
/// On cancel, unfinished tasks are aborted and only completed results kept.
async fn drain<T: Send + 'static>(
    mut tasks: JoinSet<T>,
    cancel: &mut watch::Receiver<bool>,
) -> (Vec<T>, bool) {
    let mut results = Vec::with_capacity(tasks.len());

    if *cancel.borrow() {
        tasks.abort_all();
        return (results, true);
    }

    let mut watching = true;
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok(value)) => results.push(value),
                Some(Err(err)) => warn!(error = %err, "Sync task did not complete"),
                None => return (results, false),
            },
            changed = cancel.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                } else if *cancel.borrow() {
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        if let Ok(value) = joined {
                            results.push(value);
                        }
                    }
                    return (results, true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::index::MockVectorIndexStore;
    use crate::source::MockRecordSource;
    use crate::watermark::InMemoryWatermarkStore;
    use mockall::predicate;

    fn embedder() -> EmbeddingClient {
        EmbeddingClient::new(
            Arc::new(HashingEmbeddingProvider::new(16)),
            EmbeddingConfig::local(16),
        )
    }

    fn record(id: i64) -> PatientRecord {
        PatientRecord::new(id, format!("Patient {id}"), Utc::now()).with_age(30)
    }

    #[test]
    fn test_contiguous_prefix() {
        let mut tally = RunTally {
            scanned: vec![1, 2, 3, 5, 8],
            ..Default::default()
        };
        assert_eq!(tally.contiguous_prefix(), None);

        tally.succeeded.extend([1, 2, 5, 8]);
        assert_eq!(tally.contiguous_prefix(), Some(2));

        tally.succeeded.insert(3);
        assert_eq!(tally.contiguous_prefix(), Some(8));
    }

    #[tokio::test]
    async fn test_upsert_failures_are_recorded_per_record() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_after()
            .with(predicate::eq(None), predicate::eq(500))
            .times(1)
            .returning(|_, _| Ok(vec![record(1), record(2)]));
        source.expect_all_ids().returning(|| Ok(vec![1, 2]));

        let mut store = MockVectorIndexStore::new();
        store.expect_ensure_collection().returning(|_, _| Ok(()));
        store.expect_upsert().returning(|doc| {
            if doc.record_id == 1 {
                Err(VectorizationError::Internal("rejected".into()))
            } else {
                Ok(())
            }
        });
        store.expect_record_ids().returning(|_| Ok(vec![2]));
        store.expect_flush().returning(|| Ok(()));
        store.expect_count().returning(|_| Ok(1));

        let orchestrator = SyncOrchestrator::new(
            Arc::new(source),
            embedder(),
            Arc::new(store),
            Arc::new(InMemoryWatermarkStore::new()),
            SyncConfig::default(),
        );

        let result = orchestrator.run(Namespace::Demographic, false).await.unwrap();
        assert_eq!(result.attempted, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, vec![1]);
        assert_eq!(result.failures[0].stage, FailureStage::Upsert);
        // Record 1 failed, so nothing is covered yet
        assert_eq!(result.watermark, None);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_run_and_resets_phase() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_after()
            .returning(|_, _| Err(VectorizationError::Source("connection refused".into())));

        let mut store = MockVectorIndexStore::new();
        store.expect_ensure_collection().returning(|_, _| Ok(()));

        let orchestrator = SyncOrchestrator::new(
            Arc::new(source),
            embedder(),
            Arc::new(store),
            Arc::new(InMemoryWatermarkStore::new()),
            SyncConfig::default(),
        );

        let err = orchestrator.run(Namespace::FullProfile, false).await.unwrap_err();
        assert!(matches!(err, VectorizationError::Source(_)));

        let status = orchestrator.status(Namespace::FullProfile).await.unwrap();
        assert!(!status.running);
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(status.last_result.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_before_scanning() {
        let mut source = MockRecordSource::new();
        source.expect_fetch_after().never();

        let mut store = MockVectorIndexStore::new();
        store.expect_ensure_collection().returning(|_, _| Ok(()));
        store.expect_flush().returning(|| Ok(()));
        store.expect_count().returning(|_| Ok(0));

        let orchestrator = SyncOrchestrator::new(
            Arc::new(source),
            embedder(),
            Arc::new(store),
            Arc::new(InMemoryWatermarkStore::new()),
            SyncConfig::default(),
        );
        orchestrator.shutdown();

        let result = orchestrator.run(Namespace::Demographic, false).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.attempted, 0);
    }
}
