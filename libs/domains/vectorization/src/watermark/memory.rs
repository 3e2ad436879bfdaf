use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::WatermarkStore;
use crate::error::VectorizationResult;
use crate::models::{Namespace, SyncWatermark};

#[derive(Default)]
pub struct InMemoryWatermarkStore {
    watermarks: RwLock<HashMap<Namespace, SyncWatermark>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn load(&self, namespace: Namespace) -> VectorizationResult<Option<SyncWatermark>> {
        Ok(self.watermarks.read().await.get(&namespace).cloned())
    }

    async fn save(&self, watermark: SyncWatermark) -> VectorizationResult<()> {
        self.watermarks
            .write()
            .await
            .insert(watermark.namespace, watermark);
        Ok(())
    }

    async fn clear(&self, namespace: Namespace) -> VectorizationResult<()> {
        self.watermarks.write().await.remove(&namespace);
        Ok(())
    }
}
