//! Testing harness for connector implementations.
//!
//! Helper constructors shared by unit tests across the workspace.

use crate::traits::{AuthConfig, ClientConfig, Comment, Ticket, TicketFieldValue};
use chrono::{DateTime, Utc};

/// Creates a test client config with sensible defaults and no retries.
pub fn test_client_config(name: &str, base_url: &str) -> ClientConfig {
    ClientConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth: AuthConfig::None,
        timeout_secs: 30,
        max_retries: 0,
        headers: Default::default(),
    }
}

/// Creates a sample ticket created at the given RFC 3339 timestamp.
pub fn sample_ticket(id: u64, requester_id: u64, created_at: &str) -> Ticket {
    let created: DateTime<Utc> = created_at.parse().expect("valid timestamp");
    Ticket {
        id,
        subject: format!("Sample ticket {}", id),
        description: format!("Description for ticket {}", id),
        status: "solved".to_string(),
        priority: Some("normal".to_string()),
        tags: vec!["support".to_string()],
        created_at: created,
        updated_at: created,
        requester_id,
        assignee_id: Some(42),
        custom_fields: Vec::new(),
    }
}

/// Creates a sample ticket carrying the given custom field values.
pub fn sample_ticket_with_fields(
    id: u64,
    requester_id: u64,
    created_at: &str,
    custom_fields: Vec<TicketFieldValue>,
) -> Ticket {
    let mut ticket = sample_ticket(id, requester_id, created_at);
    ticket.custom_fields = custom_fields;
    ticket
}

/// Creates a sample comment timestamped by its id for stable ordering.
pub fn sample_comment(id: u64, author_id: u64, body: &str, public: bool) -> Comment {
    let base: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().expect("valid timestamp");
    Comment {
        id,
        author_id,
        body: body.to_string(),
        created_at: base + chrono::Duration::minutes(id as i64),
        public,
    }
}
