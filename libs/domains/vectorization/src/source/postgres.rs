use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tracing::debug;

use super::{RecordSource, SourceStats, entity};
use crate::error::VectorizationResult;
use crate::models::PatientRecord;

/// Patients table reader
pub struct PgPatientSource {
    db: DatabaseConnection,
    reference_date: Option<NaiveDate>,
}

impl PgPatientSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            reference_date: None,
        }
    }

    /// Compute ages against a fixed date instead of today
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[async_trait]
impl RecordSource for PgPatientSource {
    async fn fetch_after(
        &self,
        after: Option<i64>,
        limit: u64,
    ) -> VectorizationResult<Vec<PatientRecord>> {
        let mut query = entity::Entity::find();
        if let Some(after) = after {
            query = query.filter(entity::Column::PatientId.gt(after));
        }

        let models = query
            .order_by_asc(entity::Column::PatientId)
            .limit(limit)
            .all(&self.db)
            .await?;

        debug!(?after, rows = models.len(), "Fetched patient page");

        let today = self.today();
        Ok(models.into_iter().map(|m| m.into_record(today)).collect())
    }

    async fn all_ids(&self) -> VectorizationResult<Vec<i64>> {
        let ids = entity::Entity::find()
            .select_only()
            .column(entity::Column::PatientId)
            .order_by_asc(entity::Column::PatientId)
            .into_tuple::<i64>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }

    async fn stats(&self) -> VectorizationResult<SourceStats> {
        let total = entity::Entity::find().count(&self.db).await?;
        let with_email = entity::Entity::find()
            .filter(entity::Column::Email.is_not_null())
            .filter(entity::Column::Email.ne(""))
            .count(&self.db)
            .await?;
        let with_phone = entity::Entity::find()
            .filter(entity::Column::Phone.is_not_null())
            .filter(entity::Column::Phone.ne(""))
            .count(&self.db)
            .await?;

        Ok(SourceStats {
            total,
            with_email,
            with_phone,
        })
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        database::postgres::check_health(&self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn model(id: i64, name: &str, birth: Option<NaiveDate>) -> entity::Model {
        entity::Model {
            patient_id: id,
            full_name: name.to_string(),
            identification_number: Some(format!("ID-{id}")),
            birth_date: birth,
            phone: None,
            email: Some(format!("p{id}@example.com")),
            gender: Some("F".to_string()),
            blood_type: Some("A+".to_string()),
            created_at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 15, 0, 0, 0)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fetch_after_maps_rows_and_ages() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                model(5, "Laura Gomez", NaiveDate::from_ymd_opt(1980, 7, 20)),
                model(6, "Pedro Diaz", None),
            ]])
            .into_connection();

        let source = PgPatientSource::new(db)
            .with_reference_date(NaiveDate::from_ymd_opt(2024, 7, 19).unwrap());
        let records = source.fetch_after(Some(4), 100).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 5);
        assert_eq!(records[0].name, "Laura Gomez");
        assert_eq!(records[0].age, Some(43));
        assert_eq!(records[0].identification.as_deref(), Some("ID-5"));
        assert_eq!(records[1].age, None);
    }

    #[tokio::test]
    async fn test_fetch_after_empty_page() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<entity::Model>::new()])
            .into_connection();

        let source = PgPatientSource::new(db);
        assert!(source.fetch_after(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_database_error_maps_to_source_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([sea_orm::DbErr::Custom("connection reset".into())])
            .into_connection();

        let source = PgPatientSource::new(db);
        let err = source.fetch_after(None, 10).await.unwrap_err();
        assert!(matches!(err, crate::error::VectorizationError::Source(_)));
    }
}
