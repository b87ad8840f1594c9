//! Run audit records in the ticketing platform's custom-object store.
//!
//! Each ingestion run writes one record at its terminal state, success or
//! failure. Audit writes are strictly best-effort: a recorder failure is
//! logged and swallowed, never failing the run.
//!
//! The write is two-step by platform constraint: the record is created with
//! only a human-readable name, then patched with the structured field
//! payload (the platform rejects custom-field values on creation against a
//! freshly created schema).

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tl_connectors::{
    ConnectorError, ConnectorResult, CustomObjectStore, ObjectFieldSpec, ObjectSchema,
};
use tracing::{debug, info, warn};

/// Object type for successful-run records.
pub const SUCCESS_OBJECT_KEY: &str = "ticket_import_success";

/// Object type for failed-run records.
pub const FAILURE_OBJECT_KEY: &str = "ticket_import_failure";

fn success_schema() -> (ObjectSchema, Vec<ObjectFieldSpec>) {
    (
        ObjectSchema {
            key: SUCCESS_OBJECT_KEY.to_string(),
            title: "Ticket Import".to_string(),
            title_pluralized: "Ticket Imports".to_string(),
        },
        vec![
            ObjectFieldSpec::new("import_date", "date", "Import Date"),
            ObjectFieldSpec::new("start_date", "date", "Start Date"),
            ObjectFieldSpec::new("end_date", "date", "End Date"),
            ObjectFieldSpec::new("ticket_count", "integer", "Ticket Count"),
            ObjectFieldSpec::new("source", "text", "Source"),
        ],
    )
}

fn failure_schema() -> (ObjectSchema, Vec<ObjectFieldSpec>) {
    (
        ObjectSchema {
            key: FAILURE_OBJECT_KEY.to_string(),
            title: "Ticket Import Error".to_string(),
            title_pluralized: "Ticket Import Errors".to_string(),
        },
        vec![
            ObjectFieldSpec::new("error_date", "date", "Error Date"),
            ObjectFieldSpec::new("start_date", "date", "Start Date"),
            ObjectFieldSpec::new("end_date", "date", "End Date"),
            ObjectFieldSpec::new("error_message", "text", "Error Message"),
            ObjectFieldSpec::new("error_details", "text", "Error Details"),
            ObjectFieldSpec::new("source", "text", "Source"),
        ],
    )
}

/// Writes per-run audit records through a [`CustomObjectStore`].
pub struct AuditRecorder<O> {
    store: Arc<O>,
}

impl<O: CustomObjectStore> AuditRecorder<O> {
    pub fn new(store: Arc<O>) -> Self {
        Self { store }
    }

    /// Idempotently creates both audit object types and their fields.
    ///
    /// Field creation is always attempted, even when the schema already
    /// existed; the platform answers 422 for fields that exist and those
    /// responses are absorbed.
    pub async fn ensure_schema(&self) -> ConnectorResult<()> {
        for (schema, fields) in [success_schema(), failure_schema()] {
            if !self.store.object_schema_exists(&schema.key).await? {
                info!(key = %schema.key, "Audit object type missing, creating");
                self.store.create_object_schema(&schema).await?;
            }

            for field in &fields {
                match self.store.create_object_field(&schema.key, field).await {
                    Ok(()) => {}
                    Err(ConnectorError::Conflict(_)) => {
                        debug!(key = %schema.key, field = %field.key, "Field already exists");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    /// Records a successful run. Returns the record id, or `None` if the
    /// write failed (logged, never fatal).
    pub async fn record_success(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
        ticket_count: usize,
        source: &str,
    ) -> Option<String> {
        let today = Utc::now().date_naive();
        let name = format!("Ticket Import {} ({} tickets)", today, ticket_count);

        let mut fields = HashMap::new();
        fields.insert("import_date".to_string(), json!(today.to_string()));
        insert_range(&mut fields, range);
        fields.insert("ticket_count".to_string(), json!(ticket_count));
        fields.insert("source".to_string(), json!(source));

        self.write_record(SUCCESS_OBJECT_KEY, &name, fields).await
    }

    /// Records a failed run with its error summary and detail. Returns the
    /// record id, or `None` if the write failed.
    pub async fn record_failure(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
        error_message: &str,
        error_details: &str,
        source: &str,
    ) -> Option<String> {
        let today = Utc::now().date_naive();
        let name = format!("Ticket Import Error {}", today);

        let mut fields = HashMap::new();
        fields.insert("error_date".to_string(), json!(today.to_string()));
        insert_range(&mut fields, range);
        fields.insert("error_message".to_string(), json!(error_message));
        fields.insert("error_details".to_string(), json!(error_details));
        fields.insert("source".to_string(), json!(source));

        self.write_record(FAILURE_OBJECT_KEY, &name, fields).await
    }

    async fn write_record(
        &self,
        object_key: &str,
        name: &str,
        fields: HashMap<String, Value>,
    ) -> Option<String> {
        let record_id = match self.store.create_record(object_key, name).await {
            Ok(id) => id,
            Err(e) => {
                warn!(object_key, error = %e, "Audit record creation failed, skipping");
                return None;
            }
        };

        if let Err(e) = self
            .store
            .update_record(object_key, &record_id, &fields)
            .await
        {
            warn!(object_key, record_id, error = %e, "Audit record patch failed");
            return None;
        }

        debug!(object_key, record_id, "Wrote audit record");
        Some(record_id)
    }
}

fn insert_range(fields: &mut HashMap<String, Value>, range: Option<(NaiveDate, NaiveDate)>) {
    if let Some((start, end)) = range {
        fields.insert("start_date".to_string(), json!(start.to_string()));
        fields.insert("end_date".to_string(), json!(end.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_connectors::ticketing::MockObjectStore;

    fn range() -> Option<(NaiveDate, NaiveDate)> {
        Some((
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_both_object_types() {
        let store = Arc::new(MockObjectStore::new());
        let recorder = AuditRecorder::new(Arc::clone(&store));

        recorder.ensure_schema().await.unwrap();

        assert!(store.object_schema_exists(SUCCESS_OBJECT_KEY).await.unwrap());
        assert!(store.object_schema_exists(FAILURE_OBJECT_KEY).await.unwrap());
        assert_eq!(store.field_count(SUCCESS_OBJECT_KEY), 5);
        assert_eq!(store.field_count(FAILURE_OBJECT_KEY), 6);
    }

    #[tokio::test]
    async fn test_ensure_schema_second_run_absorbs_field_conflicts() {
        let store = Arc::new(MockObjectStore::new());
        let recorder = AuditRecorder::new(Arc::clone(&store));

        recorder.ensure_schema().await.unwrap();
        // Second startup: schemas exist, field creates answer 422
        recorder.ensure_schema().await.unwrap();

        assert_eq!(store.field_count(SUCCESS_OBJECT_KEY), 5);
        assert_eq!(store.field_count(FAILURE_OBJECT_KEY), 6);
    }

    #[tokio::test]
    async fn test_record_success_creates_then_patches() {
        let store = Arc::new(MockObjectStore::new());
        let recorder = AuditRecorder::new(Arc::clone(&store));

        let id = recorder.record_success(range(), 3, "zendesk").await;
        assert!(id.is_some());

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].object_key, SUCCESS_OBJECT_KEY);
        assert!(records[0].name.contains("3 tickets"));

        let fields = records[0].fields.as_ref().expect("patched");
        assert_eq!(fields["ticket_count"], 3);
        assert_eq!(fields["start_date"], "2024-06-01");
        assert_eq!(fields["end_date"], "2024-06-30");
        assert_eq!(fields["source"], "zendesk");
    }

    #[tokio::test]
    async fn test_record_failure_carries_error_detail() {
        let store = Arc::new(MockObjectStore::new());
        let recorder = AuditRecorder::new(Arc::clone(&store));

        let id = recorder
            .record_failure(range(), "embedding failed", "stack: embed_batch", "zendesk")
            .await;
        assert!(id.is_some());

        let records = store.records();
        let fields = records[0].fields.as_ref().expect("patched");
        assert_eq!(records[0].object_key, FAILURE_OBJECT_KEY);
        assert_eq!(fields["error_message"], "embedding failed");
        assert_eq!(fields["error_details"], "stack: embed_batch");
    }

    #[tokio::test]
    async fn test_write_failure_returns_none() {
        let store = Arc::new(MockObjectStore::new().failing_create_record());
        let recorder = AuditRecorder::new(store);

        assert!(recorder.record_success(range(), 1, "zendesk").await.is_none());
    }

    #[tokio::test]
    async fn test_patch_failure_returns_none() {
        let store = Arc::new(MockObjectStore::new().failing_update_record());
        let recorder = AuditRecorder::new(store);

        assert!(recorder.record_success(range(), 1, "zendesk").await.is_none());
    }
}
