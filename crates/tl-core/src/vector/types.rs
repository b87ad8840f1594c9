//! Vector store data structures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata stored alongside a vector, used for filtering and for tracing a
/// retrieved chunk back to its ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

impl VectorMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metadata field, builder style.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(|v| v.as_i64())
    }
}

impl From<HashMap<String, Value>> for VectorMetadata {
    fn from(fields: HashMap<String, Value>) -> Self {
        Self { fields }
    }
}

/// A vector to upsert: identifier, embedding values, metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, values: Vec<f32>, metadata: VectorMetadata) -> Self {
        Self {
            id: id.into(),
            values,
            metadata,
        }
    }
}

/// A nearest-neighbor match from a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    /// Cosine similarity, higher is more similar.
    pub score: f32,
    /// Present when the query asked for metadata.
    pub metadata: Option<VectorMetadata>,
}

/// Index-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimension: usize,
    /// Fraction of index capacity in use, 0.0 to 1.0.
    pub index_fullness: f32,
    pub vector_count: u64,
}

/// Metadata-equality filter for queries: a record matches when every listed
/// field equals the given value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: HashMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key == value`, builder style.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Whether the metadata satisfies every equality constraint.
    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_accessors() {
        let mut metadata = VectorMetadata::new()
            .with_field("type", json!("overview"))
            .with_field("ticket_id", json!(1042));

        assert_eq!(metadata.get_str("type"), Some("overview"));
        assert_eq!(metadata.get_i64("ticket_id"), Some(1042));
        assert!(metadata.get("missing").is_none());

        metadata.set("part", json!(2));
        assert_eq!(metadata.get_i64("part"), Some(2));
    }

    #[test]
    fn test_filter_matches_on_all_fields() {
        let metadata = VectorMetadata::new()
            .with_field("type", json!("resolution"))
            .with_field("ticket_id", json!(7));

        assert!(MetadataFilter::new()
            .field("type", "resolution")
            .matches(&metadata));
        assert!(MetadataFilter::new()
            .field("type", "resolution")
            .field("ticket_id", 7)
            .matches(&metadata));
        assert!(!MetadataFilter::new()
            .field("type", "overview")
            .matches(&metadata));
        assert!(!MetadataFilter::new()
            .field("absent", true)
            .matches(&metadata));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(MetadataFilter::new().matches(&VectorMetadata::new()));
    }

    #[test]
    fn test_metadata_serializes_flat() {
        let metadata = VectorMetadata::new().with_field("type", json!("overview"));
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, json!({"type": "overview"}));
    }
}
