use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// UUIDv5 namespace for vector document ids
const DOCUMENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_9d4b_4c7a_b1e3_58f0_a2d6_c947);

/// Read-only snapshot of one row of the patients table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatientRecord {
    pub id: i64,
    pub name: String,
    pub identification: Option<String>,
    /// Whole years at read time, computed by the source adapter
    pub age: Option<u32>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PatientRecord {
    /// Minimal record with only the required columns set
    pub fn new(id: i64, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            identification: None,
            age: None,
            birth_date: None,
            phone: None,
            email: None,
            gender: None,
            blood_type: None,
            created_at,
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_birth_date(mut self, birth_date: NaiveDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    pub fn with_identification(mut self, identification: impl Into<String>) -> Self {
        self.identification = Some(identification.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_blood_type(mut self, blood_type: impl Into<String>) -> Self {
        self.blood_type = Some(blood_type.into());
        self
    }
}

/// Logical partition of the index. Each namespace owns one collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
    #[default]
    FullProfile,
    Demographic,
}

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Conjunction of `key == value` conditions over document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetadataFilter {
    #[schema(value_type = Object)]
    pub equals: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Entry stored in a namespace collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: Uuid,
    pub namespace: Namespace,
    pub record_id: i64,
    pub content_text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub vectorized_at: DateTime<Utc>,
}

impl VectorDocument {
    /// Stable id for a (namespace, record) pair
    pub fn document_id(namespace: Namespace, record_id: i64) -> Uuid {
        Uuid::new_v5(
            &DOCUMENT_ID_NAMESPACE,
            format!("{namespace}/{record_id}").as_bytes(),
        )
    }
}

/// Raw k-NN hit returned by an index store
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub id: Uuid,
    pub record_id: i64,
    pub score: f32,
    pub content_text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncWatermark {
    pub namespace: Namespace,
    /// Highest record id with a complete, gap-free sync behind it
    pub last_record_id: i64,
    pub updated_at: DateTime<Utc>,
}

/// Semantic search request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 10000, message = "query must be 1-10000 characters"))]
    pub query: String,

    /// Defaults to the configured top_k. The upper bound is configured per deployment.
    #[validate(range(min = 1, message = "top_k must be at least 1"))]
    pub top_k: Option<usize>,

    /// Defaults to the configured similarity threshold
    #[validate(range(min = 0.0, max = 1.0, message = "threshold must be between 0 and 1"))]
    pub threshold: Option<f32>,

    #[serde(default)]
    pub namespace: Namespace,

    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,

    #[serde(default)]
    pub filter: Option<MetadataFilter>,
}

fn default_include_metadata() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            threshold: None,
            namespace: Namespace::default(),
            include_metadata: true,
            filter: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub document_id: Uuid,
    pub record_id: i64,
    pub content_text: String,
    /// Cosine similarity in [0, 1]
    pub similarity_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub query: String,
    pub namespace: Namespace,
    pub embedding_model: String,
    pub documents: Vec<SearchResult>,
    pub total_documents: usize,
    pub search_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Pipeline stage a record failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureStage {
    Projection,
    Embedding,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordFailure {
    pub record_id: i64,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Ignore the watermark and re-vectorize every record
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncResult {
    pub namespace: Namespace,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<i64>,
    pub failures: Vec<RecordFailure>,
    /// Documents removed because their record left the source
    pub deleted: usize,
    pub watermark: Option<i64>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Scanning,
    Projecting,
    Embedding,
    Upserting,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncStatus {
    pub namespace: Namespace,
    pub phase: SyncPhase,
    pub running: bool,
    pub watermark: Option<SyncWatermark>,
    pub last_result: Option<SyncResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthReport {
    pub adapter_ok: bool,
    pub embedding_ok: bool,
    pub index_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_patients: Option<u64>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.adapter_ok && self.embedding_ok && self.index_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionSummary {
    pub namespace: Namespace,
    pub collection_name: String,
    pub documents: u64,
    pub watermark: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetResult {
    pub namespace: Namespace,
    pub documents_removed: usize,
}

/// Aggregate view of the patients table
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientSummary {
    pub total_patients: u64,
    pub patients_with_email: u64,
    pub patients_with_phone: u64,
    pub sample_descriptions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_namespace_string_forms() {
        assert_eq!(Namespace::FullProfile.to_string(), "full_profile");
        assert_eq!(Namespace::from_str("demographic").unwrap(), Namespace::Demographic);
        assert!(Namespace::from_str("billing").is_err());
        assert_eq!(Namespace::iter().count(), 2);

        let json = serde_json::to_string(&Namespace::Demographic).unwrap();
        assert_eq!(json, "\"demographic\"");
    }

    #[test]
    fn test_document_id_is_stable_and_namespaced() {
        let a = VectorDocument::document_id(Namespace::FullProfile, 7);
        let b = VectorDocument::document_id(Namespace::FullProfile, 7);
        let c = VectorDocument::document_id(Namespace::Demographic, 7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_metadata_filter_conjunction() {
        let mut metadata = Metadata::new();
        metadata.insert("gender".into(), "female".into());
        metadata.insert("age".into(), MetadataValue::Integer(34));

        assert!(MetadataFilter::new().matches(&metadata));
        assert!(MetadataFilter::new().eq("gender", "female").matches(&metadata));
        assert!(
            MetadataFilter::new()
                .eq("gender", "female")
                .eq("age", 34i64)
                .matches(&metadata)
        );
        assert!(
            !MetadataFilter::new()
                .eq("gender", "female")
                .eq("age", 35i64)
                .matches(&metadata)
        );
        assert!(!MetadataFilter::new().eq("blood_type", "O+").matches(&metadata));
    }

    #[test]
    fn test_metadata_value_untagged_json() {
        let value: MetadataValue = serde_json::from_str("42").unwrap();
        assert_eq!(value, MetadataValue::Integer(42));
        let value: MetadataValue = serde_json::from_str("0.5").unwrap();
        assert_eq!(value, MetadataValue::Float(0.5));
        let value: MetadataValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, MetadataValue::Bool(true));
        let value: MetadataValue = serde_json::from_str("\"O+\"").unwrap();
        assert_eq!(value, MetadataValue::String("O+".into()));
    }

    #[test]
    fn test_search_request_defaults_from_json() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "diabetic"}"#).unwrap();
        assert_eq!(request.namespace, Namespace::FullProfile);
        assert!(request.include_metadata);
        assert!(request.top_k.is_none());
        assert!(request.filter.is_none());
    }

    #[test]
    fn test_search_request_validation() {
        assert!(SearchRequest::new("patients over 60").validate().is_ok());
        assert!(SearchRequest::new("").validate().is_err());
        assert!(SearchRequest::new("x").with_top_k(0).validate().is_err());
        assert!(SearchRequest::new("x").with_threshold(1.5).validate().is_err());
        assert!(SearchRequest::new("x".repeat(10_001)).validate().is_err());
    }
}
