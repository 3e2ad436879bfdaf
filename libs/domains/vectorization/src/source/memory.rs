use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordSource, SourceStats};
use crate::error::VectorizationResult;
use crate::models::PatientRecord;

/// Record source backed by an in-memory map, for local runs and tests
#[derive(Default)]
pub struct InMemoryRecordSource {
    records: RwLock<BTreeMap<i64, PatientRecord>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = PatientRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    /// Insert or replace a record
    pub async fn insert(&self, record: PatientRecord) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn remove(&self, id: i64) -> Option<PatientRecord> {
        self.records.write().await.remove(&id)
    }
}

fn has_value(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn fetch_after(
        &self,
        after: Option<i64>,
        limit: u64,
    ) -> VectorizationResult<Vec<PatientRecord>> {
        let records = self.records.read().await;
        let start = after.map_or(i64::MIN, |a| a.saturating_add(1));
        Ok(records
            .range(start..)
            .take(limit as usize)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn all_ids(&self) -> VectorizationResult<Vec<i64>> {
        Ok(self.records.read().await.keys().copied().collect())
    }

    async fn stats(&self) -> VectorizationResult<SourceStats> {
        let records = self.records.read().await;
        Ok(SourceStats {
            total: records.len() as u64,
            with_email: records.values().filter(|r| has_value(&r.email)).count() as u64,
            with_phone: records.values().filter(|r| has_value(&r.phone)).count() as u64,
        })
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        Ok(())
    }
}
