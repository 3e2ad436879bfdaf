//! Read-only access to the relational source of truth

pub mod entity;
mod memory;
mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::VectorizationResult;
use crate::models::PatientRecord;

pub use memory::InMemoryRecordSource;
pub use postgres::PgPatientSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SourceStats {
    pub total: u64,
    pub with_email: u64,
    pub with_phone: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Up to `limit` records with id greater than `after`, ascending by id
    async fn fetch_after(
        &self,
        after: Option<i64>,
        limit: u64,
    ) -> VectorizationResult<Vec<PatientRecord>>;

    /// Every record id currently in the source
    async fn all_ids(&self) -> VectorizationResult<Vec<i64>>;

    async fn stats(&self) -> VectorizationResult<SourceStats>;

    async fn health_check(&self) -> VectorizationResult<()>;
}
