//! Deterministic natural-language rendering of patient records.
//!
//! Each namespace has its own template. The output only depends on the record,
//! so re-projecting an unchanged record always yields the same bytes and the
//! same `content_hash`.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use crate::error::{VectorizationError, VectorizationResult};
use crate::models::{Metadata, MetadataValue, Namespace, PatientRecord};

const DATE_FORMAT: &str = "%B %d, %Y";

/// Render `record` as the description used for `namespace`
pub fn project(record: &PatientRecord, namespace: Namespace) -> VectorizationResult<String> {
    match namespace {
        Namespace::FullProfile => full_profile(record),
        Namespace::Demographic => demographic(record),
    }
}

fn full_profile(record: &PatientRecord) -> VectorizationResult<String> {
    let name = record.name.trim();
    if name.is_empty() {
        return Err(projection_error(record, Namespace::FullProfile, "name is required"));
    }

    let mut text = format!("Patient {name}");

    if let Some(identification) = non_blank(&record.identification) {
        text.push_str(&format!(" with identification number {identification}"));
    }
    if let Some(age) = record.age {
        text.push_str(&format!(", {age} years old"));
    }
    if let Some(birth_date) = record.birth_date {
        text.push_str(&format!(", born on {}", format_date(birth_date)));
    }
    if let Some(gender) = normalize_gender(record.gender.as_deref()) {
        text.push_str(&format!(", gender {gender}"));
    }
    if let Some(blood_type) = non_blank(&record.blood_type) {
        text.push_str(&format!(", blood type {blood_type}"));
    }
    if let Some(phone) = non_blank(&record.phone) {
        text.push_str(&format!(", contact phone {phone}"));
    }
    if let Some(email) = non_blank(&record.email) {
        text.push_str(&format!(", email address {email}"));
    }
    text.push_str(&format!(", registered on {}.", format_timestamp(record.created_at)));

    Ok(text)
}

fn demographic(record: &PatientRecord) -> VectorizationResult<String> {
    let age = record
        .age
        .ok_or_else(|| projection_error(record, Namespace::Demographic, "age is required"))?;

    let subject = match normalize_gender(record.gender.as_deref()).as_deref() {
        Some("male") => "Male patient".to_string(),
        Some("female") => "Female patient".to_string(),
        Some(other) => format!("Patient of gender {other}"),
        None => "Patient of unspecified gender".to_string(),
    };
    let blood_type = non_blank(&record.blood_type).unwrap_or("unspecified");

    Ok(format!(
        "{subject}, {age} years old, blood type {blood_type}, registered on {}.",
        format_timestamp(record.created_at)
    ))
}

/// Canonical lower-case gender, or `None` when absent
pub fn normalize_gender(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim().to_lowercase();
    match value.as_str() {
        "" => None,
        "m" | "male" | "masculino" | "hombre" => Some("male".to_string()),
        "f" | "female" | "femenino" | "mujer" => Some("female".to_string()),
        _ => Some(value),
    }
}

/// Metadata schema stored alongside the vector for `namespace`
pub fn metadata(
    record: &PatientRecord,
    namespace: Namespace,
    content_text: &str,
    vectorized_at: DateTime<Utc>,
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("record_id".into(), MetadataValue::Integer(record.id));
    metadata.insert("namespace".into(), namespace.to_string().into());
    if let Some(age) = record.age {
        metadata.insert("age".into(), MetadataValue::Integer(i64::from(age)));
    }
    metadata.insert(
        "gender".into(),
        normalize_gender(record.gender.as_deref())
            .unwrap_or_else(|| "unspecified".to_string())
            .into(),
    );
    metadata.insert(
        "blood_type".into(),
        non_blank(&record.blood_type).unwrap_or("unspecified").into(),
    );
    metadata.insert("created_at".into(), record.created_at.to_rfc3339().into());
    metadata.insert("content_hash".into(), content_hash(content_text).into());
    metadata.insert("vectorized_at".into(), vectorized_at.to_rfc3339().into());

    if namespace == Namespace::FullProfile {
        metadata.insert("name".into(), record.name.trim().into());
        metadata.insert("has_email".into(), non_blank(&record.email).is_some().into());
        metadata.insert("has_phone".into(), non_blank(&record.phone).is_some().into());
    }

    metadata
}

/// Hex SHA-256 of the projected text
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn projection_error(record: &PatientRecord, namespace: Namespace, reason: &str) -> VectorizationError {
    VectorizationError::Projection {
        record_id: record.id,
        namespace,
        reason: reason.to_string(),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    format_date(ts.date_naive())
}
