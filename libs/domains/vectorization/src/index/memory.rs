use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{VectorIndexStore, cosine_similarity};
use crate::config::IndexConfig;
use crate::error::{VectorizationError, VectorizationResult};
use crate::models::{MetadataFilter, Namespace, ScoredDocument, VectorDocument};

const SNAPSHOT_FILE: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    dimension: Option<usize>,
    /// Insertion counter used to break score ties
    next_seq: u64,
    entries: BTreeMap<Uuid, Entry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    document: VectorDocument,
}

/// Brute-force index held in memory, optionally snapshotted to a JSON file
pub struct InMemoryIndexStore {
    collections: RwLock<BTreeMap<Namespace, Collection>>,
    names: HashMap<Namespace, String>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryIndexStore {
    /// Volatile store, nothing is written to disk
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            names: collection_names(config),
            snapshot_path: None,
        }
    }

    /// Store persisted under `dir`, loading an existing snapshot if present
    pub async fn open(config: &IndexConfig, dir: impl AsRef<Path>) -> VectorizationResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(SNAPSHOT_FILE);

        let collections = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let collections: BTreeMap<Namespace, Collection> = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    documents = collections.values().map(|c| c.entries.len()).sum::<usize>(),
                    "Loaded index snapshot"
                );
                collections
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            collections: RwLock::new(collections),
            names: collection_names(config),
            snapshot_path: Some(path),
        })
    }
}

fn collection_names(config: &IndexConfig) -> HashMap<Namespace, String> {
    [Namespace::FullProfile, Namespace::Demographic]
        .into_iter()
        .map(|ns| (ns, config.collection_name(ns).to_string()))
        .collect()
}

#[async_trait]
impl VectorIndexStore for InMemoryIndexStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn collection_name(&self, namespace: Namespace) -> String {
        self.names
            .get(&namespace)
            .cloned()
            .unwrap_or_else(|| namespace.to_string())
    }

    async fn ensure_collection(
        &self,
        namespace: Namespace,
        dimension: usize,
    ) -> VectorizationResult<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(namespace).or_default();
        match collection.dimension {
            Some(existing) if existing != dimension && !collection.entries.is_empty() => {
                Err(VectorizationError::Internal(format!(
                    "collection '{}' holds {existing}-dimensional vectors, got {dimension}",
                    self.collection_name(namespace)
                )))
            }
            _ => {
                collection.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, document: VectorDocument) -> VectorizationResult<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(document.namespace).or_default();

        if let Some(dimension) = collection.dimension {
            if dimension != document.embedding.len() {
                return Err(VectorizationError::Internal(format!(
                    "expected {dimension}-dimensional vector, got {}",
                    document.embedding.len()
                )));
            }
        } else {
            collection.dimension = Some(document.embedding.len());
        }

        let seq = match collection.entries.get(&document.id) {
            Some(existing) => existing.seq,
            None => {
                collection.next_seq += 1;
                collection.next_seq
            }
        };
        collection.entries.insert(document.id, Entry { seq, document });
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, id: Uuid) -> VectorizationResult<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(&namespace)
            .is_some_and(|c| c.entries.remove(&id).is_some()))
    }

    async fn query(
        &self,
        namespace: Namespace,
        embedding: &[f32],
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> VectorizationResult<Vec<ScoredDocument>> {
        let collections = self.collections.read().await;
        let Some(collection) = collections.get(&namespace) else {
            return Ok(vec![]);
        };

        let mut scored: Vec<(f32, u64, &VectorDocument)> = collection
            .entries
            .values()
            .filter(|e| filter.as_ref().is_none_or(|f| f.matches(&e.document.metadata)))
            .map(|e| (cosine_similarity(embedding, &e.document.embedding), e.seq, &e.document))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, _, doc)| ScoredDocument {
                id: doc.id,
                record_id: doc.record_id,
                score,
                content_text: doc.content_text.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect())
    }

    async fn count(&self, namespace: Namespace) -> VectorizationResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&namespace)
            .map_or(0, |c| c.entries.len() as u64))
    }

    async fn record_ids(&self, namespace: Namespace) -> VectorizationResult<Vec<i64>> {
        let collections = self.collections.read().await;
        let mut ids: Vec<i64> = collections
            .get(&namespace)
            .map(|c| c.entries.values().map(|e| e.document.record_id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn reset(&self, namespace: Namespace) -> VectorizationResult<usize> {
        let mut collections = self.collections.write().await;
        let removed = collections
            .remove(&namespace)
            .map_or(0, |c| c.entries.len());
        debug!(%namespace, removed, "Reset in-memory collection");
        Ok(removed)
    }

    async fn flush(&self) -> VectorizationResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let bytes = {
            let collections = self.collections.read().await;
            serde_json::to_vec(&*collections)?
        };

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Flushed index snapshot");
        Ok(())
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        Ok(())
    }
}
