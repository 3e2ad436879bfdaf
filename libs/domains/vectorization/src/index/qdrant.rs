use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, GetPointsBuilder, PointId, PointStruct, Range, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::VectorIndexStore;
use crate::config::IndexConfig;
use crate::error::{VectorizationError, VectorizationResult};
use crate::models::{Metadata, MetadataFilter, MetadataValue, Namespace, ScoredDocument, VectorDocument};

const CONTENT_TEXT_KEY: &str = "content_text";
const RECORD_ID_KEY: &str = "record_id";
const SCROLL_PAGE: u32 = 256;

/// Qdrant-backed index. Each namespace maps to one cosine collection.
pub struct QdrantIndexStore {
    client: Qdrant,
    full_profile_collection: String,
    demographic_collection: String,
}

impl QdrantIndexStore {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        config: &IndexConfig,
    ) -> VectorizationResult<Self> {
        let mut builder = Qdrant::from_url(url);

        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }

        builder = builder.timeout(Duration::from_secs(timeout_secs));

        let client = builder
            .build()
            .map_err(|e| VectorizationError::IndexStore(format!("Failed to build client: {e}")))?;

        Ok(Self::from_client(client, config))
    }

    pub fn from_client(client: Qdrant, config: &IndexConfig) -> Self {
        Self {
            client,
            full_profile_collection: config.collection_name(Namespace::FullProfile).to_string(),
            demographic_collection: config.collection_name(Namespace::Demographic).to_string(),
        }
    }

    fn name(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::FullProfile => &self.full_profile_collection,
            Namespace::Demographic => &self.demographic_collection,
        }
    }

    async fn exists(&self, namespace: Namespace) -> VectorizationResult<bool> {
        Ok(self.client.collection_exists(self.name(namespace)).await?)
    }
}

fn point_id(id: Uuid) -> PointId {
    PointId::from(id.to_string())
}

fn point_id_to_uuid(point_id: &PointId) -> VectorizationResult<Uuid> {
    match &point_id.point_id_options {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid_str)) => Uuid::parse_str(uuid_str)
            .map_err(|e| VectorizationError::IndexStore(format!("Invalid point UUID: {e}"))),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => Ok(Uuid::from_u128(*num as u128)),
        None => Err(VectorizationError::IndexStore("Missing point ID".to_string())),
    }
}

fn metadata_to_qdrant(value: &MetadataValue) -> QdrantValue {
    match value {
        MetadataValue::Bool(b) => QdrantValue::from(*b),
        MetadataValue::Integer(i) => QdrantValue::from(*i),
        MetadataValue::Float(f) => QdrantValue::from(*f),
        MetadataValue::String(s) => QdrantValue::from(s.clone()),
    }
}

fn qdrant_to_metadata(value: QdrantValue) -> Option<MetadataValue> {
    use qdrant::value::Kind;

    match value.kind? {
        Kind::BoolValue(b) => Some(MetadataValue::Bool(b)),
        Kind::IntegerValue(i) => Some(MetadataValue::Integer(i)),
        Kind::DoubleValue(f) => Some(MetadataValue::Float(f)),
        Kind::StringValue(s) => Some(MetadataValue::String(s)),
        _ => None,
    }
}

/// Payload layout: metadata keys at the top level plus `content_text`
fn document_payload(document: &VectorDocument) -> HashMap<String, QdrantValue> {
    let mut payload: HashMap<String, QdrantValue> = document
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), metadata_to_qdrant(v)))
        .collect();
    payload.insert(RECORD_ID_KEY.to_string(), QdrantValue::from(document.record_id));
    payload.insert(
        CONTENT_TEXT_KEY.to_string(),
        QdrantValue::from(document.content_text.clone()),
    );
    payload
}

/// Split a stored payload back into (record_id, content_text, metadata)
fn split_payload(
    payload: HashMap<String, QdrantValue>,
) -> VectorizationResult<(i64, String, Metadata)> {
    let mut metadata = Metadata::new();
    let mut content_text = String::new();

    for (key, value) in payload {
        match (key.as_str(), qdrant_to_metadata(value)) {
            (CONTENT_TEXT_KEY, Some(MetadataValue::String(text))) => content_text = text,
            (_, Some(value)) => {
                metadata.insert(key, value);
            }
            (_, None) => {}
        }
    }

    let record_id = match metadata.get(RECORD_ID_KEY) {
        Some(MetadataValue::Integer(id)) => *id,
        _ => {
            return Err(VectorizationError::IndexStore(
                "Point payload is missing record_id".to_string(),
            ));
        }
    };

    Ok((record_id, content_text, metadata))
}

fn build_filter(filter: &MetadataFilter) -> Filter {
    let conditions: Vec<Condition> = filter
        .equals
        .iter()
        .map(|(key, value)| match value {
            MetadataValue::String(s) => Condition::matches(key.clone(), s.clone()),
            MetadataValue::Integer(i) => Condition::matches(key.clone(), *i),
            MetadataValue::Bool(b) => Condition::matches(key.clone(), *b),
            MetadataValue::Float(f) => Condition::range(
                key.clone(),
                Range {
                    gte: Some(*f),
                    lte: Some(*f),
                    ..Default::default()
                },
            ),
        })
        .collect();

    Filter::must(conditions)
}

#[async_trait]
impl VectorIndexStore for QdrantIndexStore {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    fn collection_name(&self, namespace: Namespace) -> String {
        self.name(namespace).to_string()
    }

    async fn ensure_collection(
        &self,
        namespace: Namespace,
        dimension: usize,
    ) -> VectorizationResult<()> {
        if self.exists(namespace).await? {
            return Ok(());
        }

        let name = self.name(namespace);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await?;
        info!(collection = name, dimension, "Created Qdrant collection");
        Ok(())
    }

    async fn upsert(&self, document: VectorDocument) -> VectorizationResult<()> {
        let payload = document_payload(&document);
        let point = PointStruct::new(point_id(document.id), document.embedding, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(self.name(document.namespace), vec![point]).wait(true))
            .await?;
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, id: Uuid) -> VectorizationResult<bool> {
        let name = self.name(namespace);
        let existing = self
            .client
            .get_points(GetPointsBuilder::new(name, vec![point_id(id)]).with_payload(false))
            .await?;
        if existing.result.is_empty() {
            return Ok(false);
        }

        self.client
            .delete_points(DeletePointsBuilder::new(name).points(vec![point_id(id)]).wait(true))
            .await?;
        Ok(true)
    }

    async fn query(
        &self,
        namespace: Namespace,
        embedding: &[f32],
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> VectorizationResult<Vec<ScoredDocument>> {
        let mut builder =
            SearchPointsBuilder::new(self.name(namespace), embedding.to_vec(), top_k as u64)
                .with_payload(true);

        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(build_filter(&filter));
        }

        let response = self.client.search_points(builder).await?;

        let mut hits = response
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .as_ref()
                    .map(point_id_to_uuid)
                    .transpose()?
                    .ok_or_else(|| VectorizationError::IndexStore("Missing point ID".to_string()))?;
                let (record_id, content_text, metadata) = split_payload(point.payload)?;

                Ok(ScoredDocument {
                    id,
                    record_id,
                    score: point.score.clamp(0.0, 1.0),
                    content_text,
                    metadata,
                })
            })
            .collect::<VectorizationResult<Vec<_>>>()?;

        // Qdrant has no insertion order, ties fall back to record id
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.record_id.cmp(&b.record_id)));
        Ok(hits)
    }

    async fn count(&self, namespace: Namespace) -> VectorizationResult<u64> {
        if !self.exists(namespace).await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(self.name(namespace)).exact(true))
            .await?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn record_ids(&self, namespace: Namespace) -> VectorizationResult<Vec<i64>> {
        if !self.exists(namespace).await? {
            return Ok(vec![]);
        }

        let name = self.name(namespace);
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(name)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let page = self.client.scroll(builder).await?;
            for point in page.result {
                if let Some(qdrant::value::Kind::IntegerValue(id)) = point
                    .payload
                    .get(RECORD_ID_KEY)
                    .and_then(|v| v.kind.clone())
                {
                    ids.push(id);
                }
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        ids.sort_unstable();
        debug!(collection = name, ids = ids.len(), "Scrolled record ids");
        Ok(ids)
    }

    async fn reset(&self, namespace: Namespace) -> VectorizationResult<usize> {
        let removed = self.count(namespace).await? as usize;
        if self.exists(namespace).await? {
            // Recreated with the right dimension by the next ensure_collection
            self.client.delete_collection(self.name(namespace)).await?;
        }
        info!(collection = self.name(namespace), removed, "Reset Qdrant collection");
        Ok(removed)
    }

    async fn flush(&self) -> VectorizationResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> VectorizationResult<()> {
        self.client.health_check().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document() -> VectorDocument {
        let mut metadata = Metadata::new();
        metadata.insert("record_id".into(), MetadataValue::Integer(12));
        metadata.insert("gender".into(), "female".into());
        metadata.insert("has_email".into(), MetadataValue::Bool(true));
        metadata.insert("score_hint".into(), MetadataValue::Float(0.25));

        VectorDocument {
            id: VectorDocument::document_id(Namespace::FullProfile, 12),
            namespace: Namespace::FullProfile,
            record_id: 12,
            content_text: "Patient Ana Ruiz.".into(),
            embedding: vec![0.1, 0.2],
            metadata,
            vectorized_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_round_trip() {
        let doc = document();
        let payload = document_payload(&doc);
        assert!(payload.contains_key(CONTENT_TEXT_KEY));

        let (record_id, content_text, metadata) = split_payload(payload).unwrap();
        assert_eq!(record_id, 12);
        assert_eq!(content_text, "Patient Ana Ruiz.");
        assert_eq!(metadata, doc.metadata);
    }

    #[test]
    fn test_payload_without_record_id_is_rejected() {
        let mut payload = HashMap::new();
        payload.insert(CONTENT_TEXT_KEY.to_string(), QdrantValue::from("text".to_string()));
        assert!(split_payload(payload).is_err());
    }

    #[test]
    fn test_point_id_round_trip() {
        let id = VectorDocument::document_id(Namespace::Demographic, 99);
        assert_eq!(point_id_to_uuid(&point_id(id)).unwrap(), id);
    }

    #[test]
    fn test_filter_has_one_condition_per_key() {
        let filter = MetadataFilter::new()
            .eq("gender", "female")
            .eq("age", 40i64)
            .eq("has_email", true)
            .eq("ratio", 0.5);
        assert_eq!(build_filter(&filter).must.len(), 4);
    }
}
