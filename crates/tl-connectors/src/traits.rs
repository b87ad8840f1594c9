//! Connector trait definitions for Ticket Loom.
//!
//! Defines the interfaces the ingestion core uses to talk to the ticketing
//! platform, plus the error taxonomy and client configuration shared by all
//! HTTP-backed connectors.

use crate::secure_string::SecureString;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Whether retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed(_)
                | ConnectorError::Timeout(_)
                | ConnectorError::RateLimited(_)
        )
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Configuration for an HTTP-backed client.
///
/// Deliberately not serializable: the auth variants hold credentials, and
/// configs are assembled in code from the environment, never persisted.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client name/identifier, used in logs.
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Additional headers to include on every request.
    pub headers: HashMap<String, String>,
}

impl ClientConfig {
    /// Creates a config with the default timeout (30 s) and retry budget
    /// (5 attempts total).
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            auth,
            timeout_secs: 30,
            max_retries: 4,
            headers: HashMap::new(),
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Authentication configuration.
///
/// Credential fields use [`SecureString`] so secrets are zeroized from
/// memory when no longer needed.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// No authentication.
    None,
    /// API key in a custom header.
    ApiKey {
        key: SecureString,
        header_name: String,
    },
    /// Bearer token authentication.
    BearerToken { token: SecureString },
    /// HTTP Basic authentication.
    Basic {
        username: String,
        password: SecureString,
    },
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Returns the connector type (e.g. "ticketing").
    fn connector_type(&self) -> &str;

    /// Tests the connection to the external system.
    async fn test_connection(&self) -> ConnectorResult<bool>;
}

/// A raw ticket as returned by the ticketing platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID, unique within the source system.
    pub id: u64,
    /// Ticket subject line.
    pub subject: String,
    /// Ticket description (the first comment, per the platform).
    #[serde(default)]
    pub description: String,
    /// Current status (e.g. "open", "solved").
    pub status: String,
    /// Priority, if set.
    pub priority: Option<String>,
    /// Labels/tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-updated timestamp.
    pub updated_at: DateTime<Utc>,
    /// The user who filed the ticket.
    pub requester_id: u64,
    /// The agent the ticket is assigned to.
    pub assignee_id: Option<u64>,
    /// Custom field values keyed by field ID.
    #[serde(default)]
    pub custom_fields: Vec<TicketFieldValue>,
}

/// A custom field value attached to a ticket. The value is untyped at the
/// transport layer; the field registry supplies the declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketFieldValue {
    pub id: u64,
    #[serde(default)]
    pub value: Value,
}

/// A comment in a ticket's conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    /// The comment author; compared against the ticket requester to
    /// classify the comment as customer or agent.
    pub author_id: u64,
    /// Comment body text.
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Whether the comment is visible to the requester.
    pub public: bool,
}

/// Schema descriptor for a ticket custom field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: u64,
    /// Human-readable field title.
    pub title: String,
    /// Platform type tag (e.g. "text", "integer", "date", "tagger").
    #[serde(rename = "type")]
    pub field_type: String,
    /// Stable key, when the field defines one.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Source of tickets, comment threads, and the custom-field schema.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Streams tickets created in the inclusive date range, newest first.
    ///
    /// A page failure mid-stream truncates the result (partial progress is
    /// retained); a failure on the first page surfaces to the caller.
    async fn search_created_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ConnectorResult<Vec<Ticket>>;

    /// Fetches the full comment thread for a ticket, in server order.
    async fn list_comments(&self, ticket_id: u64) -> ConnectorResult<Vec<Comment>>;

    /// Fetches all custom field descriptors (paginated under the hood).
    async fn list_ticket_fields(&self) -> ConnectorResult<Vec<FieldDescriptor>>;
}

/// Definition of a custom-object type to ensure in the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub key: String,
    pub title: String,
    pub title_pluralized: String,
}

/// Definition of a field on a custom-object type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFieldSpec {
    pub key: String,
    /// Platform field type ("text", "date", "integer").
    #[serde(rename = "type")]
    pub field_type: String,
    pub title: String,
}

impl ObjectFieldSpec {
    pub fn new(
        key: impl Into<String>,
        field_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            field_type: field_type.into(),
            title: title.into(),
        }
    }
}

/// The ticketing platform's custom-object store, used for run audit records.
#[async_trait]
pub trait CustomObjectStore: Send + Sync {
    /// Whether an object type with the given key exists.
    async fn object_schema_exists(&self, key: &str) -> ConnectorResult<bool>;

    /// Creates an object type.
    async fn create_object_schema(&self, schema: &ObjectSchema) -> ConnectorResult<()>;

    /// Creates a field on an object type. Returns `Conflict` when the field
    /// already exists.
    async fn create_object_field(
        &self,
        object_key: &str,
        field: &ObjectFieldSpec,
    ) -> ConnectorResult<()>;

    /// Creates a record carrying only a human-readable name; returns the
    /// record ID.
    async fn create_record(&self, object_key: &str, name: &str) -> ConnectorResult<String>;

    /// Patches a record with its structured custom-field payload.
    async fn update_record(
        &self,
        object_key: &str,
        record_id: &str,
        fields: &HashMap<String, Value>,
    ) -> ConnectorResult<()>;
}
