use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::WatermarkStore;
use crate::error::VectorizationResult;
use crate::models::{Namespace, SyncWatermark};

const WATERMARK_FILE: &str = "watermarks.json";

/// Watermarks kept as one JSON document next to the index snapshot.
///
/// Writes go through a temp file and a rename so a crash never leaves a
/// half-written file behind.
pub struct FileWatermarkStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileWatermarkStore {
    pub async fn open(dir: impl AsRef<Path>) -> VectorizationResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            path: dir.join(WATERMARK_FILE),
            lock: Mutex::new(()),
        })
    }

    async fn read_all(&self) -> VectorizationResult<BTreeMap<Namespace, SyncWatermark>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(
        &self,
        watermarks: &BTreeMap<Namespace, SyncWatermark>,
    ) -> VectorizationResult<()> {
        let bytes = serde_json::to_vec_pretty(watermarks)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self, namespace: Namespace) -> VectorizationResult<Option<SyncWatermark>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(&namespace))
    }

    async fn save(&self, watermark: SyncWatermark) -> VectorizationResult<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        debug!(
            namespace = %watermark.namespace,
            last_record_id = watermark.last_record_id,
            "Saving watermark"
        );
        all.insert(watermark.namespace, watermark);
        self.write_all(&all).await
    }

    async fn clear(&self, namespace: Namespace) -> VectorizationResult<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        if all.remove(&namespace).is_some() {
            self.write_all(&all).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn watermark(namespace: Namespace, id: i64) -> SyncWatermark {
        SyncWatermark {
            namespace,
            last_record_id: id,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_load_clear_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("medbot-watermarks-{}", Uuid::new_v4()));

        let store = FileWatermarkStore::open(&dir).await.unwrap();
        assert!(store.load(Namespace::Demographic).await.unwrap().is_none());

        store.save(watermark(Namespace::Demographic, 10)).await.unwrap();
        store.save(watermark(Namespace::FullProfile, 4)).await.unwrap();

        let reopened = FileWatermarkStore::open(&dir).await.unwrap();
        assert_eq!(
            reopened.load(Namespace::Demographic).await.unwrap().map(|w| w.last_record_id),
            Some(10)
        );

        reopened.clear(Namespace::Demographic).await.unwrap();
        assert!(reopened.load(Namespace::Demographic).await.unwrap().is_none());
        assert_eq!(
            reopened.load(Namespace::FullProfile).await.unwrap().map(|w| w.last_record_id),
            Some(4)
        );

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
