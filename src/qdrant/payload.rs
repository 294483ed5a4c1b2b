//! Helpers for constructing point identifiers and payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    doc_id: &str,
    source: &str,
    chunk_index: usize,
    text: &str,
    content_hash: &str,
    timestamp_rfc3339: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("doc_id".into(), Value::String(doc_id.to_string()));
    payload.insert("source".into(), Value::String(source.to_string()));
    payload.insert("chunk_index".into(), Value::from(chunk_index));
    payload.insert(
        "content_hash".into(),
        Value::String(content_hash.to_string()),
    );
    payload.insert(
        "indexed_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    payload.insert("text".into(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Derive the point identifier for a `doc_id`.
///
/// The mapping is deterministic so re-ingesting the same chunk overwrites the
/// existing entry instead of appending a duplicate.
pub fn point_id_for(doc_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes()).to_string()
}
