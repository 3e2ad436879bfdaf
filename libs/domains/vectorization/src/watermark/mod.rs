//! Persistence of per-namespace sync watermarks

mod file;
mod memory;

use async_trait::async_trait;

use crate::error::VectorizationResult;
use crate::models::{Namespace, SyncWatermark};

pub use file::FileWatermarkStore;
pub use memory::InMemoryWatermarkStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, namespace: Namespace) -> VectorizationResult<Option<SyncWatermark>>;

    async fn save(&self, watermark: SyncWatermark) -> VectorizationResult<()>;

    async fn clear(&self, namespace: Namespace) -> VectorizationResult<()>;
}
