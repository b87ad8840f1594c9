//! Mock ticketing connector for testing.
//!
//! In-memory implementations of [`TicketSource`] and [`CustomObjectStore`]
//! with failure injection, for unit tests without a live platform.

use crate::traits::{
    Comment, Connector, ConnectorError, ConnectorResult, CustomObjectStore, FieldDescriptor,
    ObjectFieldSpec, ObjectSchema, Ticket, TicketSource,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// In-memory ticket source with failure injection.
#[derive(Default)]
pub struct MockTicketSource {
    tickets: Vec<Ticket>,
    comments: HashMap<u64, Vec<Comment>>,
    fields: Vec<FieldDescriptor>,
    fail_comments_for: HashSet<u64>,
    fail_search: bool,
    field_loads: AtomicUsize,
}

impl MockTicketSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ticket and its comment thread.
    pub fn with_ticket(mut self, ticket: Ticket, comments: Vec<Comment>) -> Self {
        self.comments.insert(ticket.id, comments);
        self.tickets.push(ticket);
        self
    }

    /// Registers a custom field descriptor.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Makes `list_comments` fail for the given ticket.
    pub fn failing_comments_for(mut self, ticket_id: u64) -> Self {
        self.fail_comments_for.insert(ticket_id);
        self
    }

    /// Makes `search_created_between` fail outright.
    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Number of times the field schema was loaded.
    pub fn field_load_count(&self) -> usize {
        self.field_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockTicketSource {
    fn name(&self) -> &str {
        "mock-ticketing"
    }

    fn connector_type(&self) -> &str {
        "ticketing"
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl TicketSource for MockTicketSource {
    async fn search_created_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ConnectorResult<Vec<Ticket>> {
        if self.fail_search {
            return Err(ConnectorError::RequestFailed("search unavailable".into()));
        }

        let mut matching: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|t| {
                let created = t.created_at.date_naive();
                created >= start && created <= end
            })
            .cloned()
            .collect();
        // Newest first, matching the platform's sort order
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn list_comments(&self, ticket_id: u64) -> ConnectorResult<Vec<Comment>> {
        if self.fail_comments_for.contains(&ticket_id) {
            return Err(ConnectorError::RequestFailed(format!(
                "comments unavailable for ticket {}",
                ticket_id
            )));
        }
        Ok(self.comments.get(&ticket_id).cloned().unwrap_or_default())
    }

    async fn list_ticket_fields(&self) -> ConnectorResult<Vec<FieldDescriptor>> {
        self.field_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.fields.clone())
    }
}

/// A record written to the mock object store.
#[derive(Debug, Clone)]
pub struct MockRecord {
    pub object_key: String,
    pub id: String,
    pub name: String,
    /// Custom field payload, set once the record has been patched.
    pub fields: Option<HashMap<String, Value>>,
}

/// In-memory custom-object store.
///
/// Field creation returns `Conflict` when the field key already exists on
/// the object type, matching the platform's 422 behavior.
#[derive(Default)]
pub struct MockObjectStore {
    schemas: RwLock<HashMap<String, ObjectSchema>>,
    schema_fields: RwLock<HashMap<String, Vec<ObjectFieldSpec>>>,
    records: RwLock<Vec<MockRecord>>,
    next_id: AtomicUsize,
    fail_create_record: bool,
    fail_update_record: bool,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_record` fail, for audit-tolerance tests.
    pub fn failing_create_record(mut self) -> Self {
        self.fail_create_record = true;
        self
    }

    /// Makes `update_record` fail after a successful create.
    pub fn failing_update_record(mut self) -> Self {
        self.fail_update_record = true;
        self
    }

    /// Snapshot of all records written so far.
    pub fn records(&self) -> Vec<MockRecord> {
        self.records.read().unwrap().clone()
    }

    /// Number of fields registered on an object type.
    pub fn field_count(&self, object_key: &str) -> usize {
        self.schema_fields
            .read()
            .unwrap()
            .get(object_key)
            .map(|f| f.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CustomObjectStore for MockObjectStore {
    async fn object_schema_exists(&self, key: &str) -> ConnectorResult<bool> {
        Ok(self.schemas.read().unwrap().contains_key(key))
    }

    async fn create_object_schema(&self, schema: &ObjectSchema) -> ConnectorResult<()> {
        self.schemas
            .write()
            .unwrap()
            .insert(schema.key.clone(), schema.clone());
        Ok(())
    }

    async fn create_object_field(
        &self,
        object_key: &str,
        field: &ObjectFieldSpec,
    ) -> ConnectorResult<()> {
        let mut fields = self.schema_fields.write().unwrap();
        let entry = fields.entry(object_key.to_string()).or_default();

        if entry.iter().any(|f| f.key == field.key) {
            return Err(ConnectorError::Conflict(format!(
                "field '{}' already exists",
                field.key
            )));
        }

        entry.push(field.clone());
        Ok(())
    }

    async fn create_record(&self, object_key: &str, name: &str) -> ConnectorResult<String> {
        if self.fail_create_record {
            return Err(ConnectorError::RequestFailed("record store down".into()));
        }

        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.records.write().unwrap().push(MockRecord {
            object_key: object_key.to_string(),
            id: id.clone(),
            name: name.to_string(),
            fields: None,
        });
        Ok(id)
    }

    async fn update_record(
        &self,
        object_key: &str,
        record_id: &str,
        fields: &HashMap<String, Value>,
    ) -> ConnectorResult<()> {
        if self.fail_update_record {
            return Err(ConnectorError::RequestFailed("record store down".into()));
        }

        let mut records = self.records.write().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.object_key == object_key && r.id == record_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("record {}", record_id)))?;

        record.fields = Some(fields.clone());
        Ok(())
    }
}
