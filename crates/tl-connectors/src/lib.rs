//! # tl-connectors
//!
//! Ticketing platform connectors for Ticket Loom: a retrying, rate-limited
//! HTTP client, credential handling, and the Zendesk connector the ingestion
//! pipeline pulls tickets and writes audit records through.

pub mod http;
pub mod secure_string;
pub mod testing;
pub mod ticketing;
pub mod traits;

// Re-export SecureString at the crate root
pub use secure_string::SecureString;

pub use traits::{
    AuthConfig, ClientConfig, Comment, Connector, ConnectorError, ConnectorResult,
    CustomObjectStore, FieldDescriptor, ObjectFieldSpec, ObjectSchema, Ticket, TicketFieldValue,
    TicketSource,
};

pub use http::{HttpClient, RateLimitConfig};
pub use ticketing::{MockObjectStore, MockTicketSource, ZendeskConfig, ZendeskConnector};
