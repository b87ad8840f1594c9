//! Ticket enrichment: conversation threading, resolution extraction, and
//! custom-field projection.
//!
//! Enrichment runs in bounded-concurrency batches; a ticket whose comment
//! thread cannot be fetched is logged and skipped, never failing the run.

use crate::fields::FieldRegistry;
use crate::model::{ConversationEntry, CustomField, EnrichedTicket, FieldType, FieldValue, Role};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tl_connectors::{Comment, ConnectorResult, Ticket, TicketSource};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum simultaneous per-ticket enrichments within a batch.
pub const ENRICH_CONCURRENCY: usize = 10;

/// Pause between enrichment batches.
pub const BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Expands raw tickets with their comment threads and typed custom fields.
pub struct Enricher<S> {
    source: Arc<S>,
    registry: Arc<FieldRegistry<S>>,
    /// Restrict resolution extraction to public agent comments.
    public_resolutions_only: bool,
}

impl<S: TicketSource + Send + Sync + 'static> Enricher<S> {
    pub fn new(source: Arc<S>, registry: Arc<FieldRegistry<S>>) -> Self {
        Self {
            source,
            registry,
            public_resolutions_only: false,
        }
    }

    /// Only consider public agent comments when extracting the resolution.
    /// The source system treats all agent comments uniformly; this is the
    /// opt-in for privacy-sensitive deployments.
    pub fn public_resolutions(mut self, public_only: bool) -> Self {
        self.public_resolutions_only = public_only;
        self
    }

    /// Enriches a single ticket.
    pub async fn enrich_ticket(&self, ticket: &Ticket) -> ConnectorResult<EnrichedTicket> {
        let comments = self.source.list_comments(ticket.id).await?;
        let conversation = build_conversation(&comments, ticket.requester_id);
        let resolution = extract_resolution(&conversation, self.public_resolutions_only);

        let fields = self.registry.get_fields().await?;
        let custom_fields = project_custom_fields(ticket, |id| {
            fields
                .get(&id)
                .map(|d| (d.title.clone(), d.field_type.clone(), d.key.clone(), d.description.clone()))
        });

        debug!(
            ticket_id = ticket.id,
            conversation_len = conversation.len(),
            has_resolution = resolution.is_some(),
            custom_fields = custom_fields.len(),
            "Enriched ticket"
        );

        Ok(EnrichedTicket {
            id: ticket.id,
            subject: ticket.subject.clone(),
            description: ticket.description.clone(),
            status: ticket.status.clone(),
            priority: ticket.priority.clone(),
            tags: ticket.tags.clone(),
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
            conversation,
            resolution,
            custom_fields,
        })
    }

    /// Enriches tickets in batches of [`ENRICH_CONCURRENCY`], pausing
    /// [`BATCH_PAUSE`] between batches.
    ///
    /// Output preserves input order. Per-ticket failures are logged and
    /// skipped.
    pub async fn enrich_all(self: &Arc<Self>, tickets: &[Ticket]) -> Vec<EnrichedTicket> {
        let mut slots: Vec<Option<EnrichedTicket>> = Vec::with_capacity(tickets.len());
        slots.resize_with(tickets.len(), || None);

        let batches = tickets.chunks(ENRICH_CONCURRENCY).count();
        for (batch_index, batch) in tickets.chunks(ENRICH_CONCURRENCY).enumerate() {
            let mut tasks = JoinSet::new();

            for (offset, ticket) in batch.iter().enumerate() {
                let enricher = Arc::clone(self);
                let ticket = ticket.clone();
                let index = batch_index * ENRICH_CONCURRENCY + offset;
                tasks.spawn(async move {
                    let result = enricher.enrich_ticket(&ticket).await;
                    (index, ticket.id, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, _, Ok(enriched))) => slots[index] = Some(enriched),
                    Ok((_, ticket_id, Err(e))) => {
                        warn!(ticket_id, error = %e, "Skipping ticket, enrichment failed");
                    }
                    Err(e) => {
                        warn!(error = %e, "Enrichment task panicked");
                    }
                }
            }

            if batch_index + 1 < batches {
                sleep(BATCH_PAUSE).await;
            }
        }

        slots.into_iter().flatten().collect()
    }
}

/// Classifies comments into the conversation: the requester is the
/// customer, everyone else is an agent. Server order is preserved.
fn build_conversation(comments: &[Comment], requester_id: u64) -> Vec<ConversationEntry> {
    comments
        .iter()
        .map(|c| ConversationEntry {
            role: if c.author_id == requester_id {
                Role::Customer
            } else {
                Role::Agent
            },
            message: c.body.clone(),
            timestamp: c.created_at,
            public: c.public,
        })
        .collect()
}

/// The resolution is the last agent entry with a non-whitespace body.
fn extract_resolution(conversation: &[ConversationEntry], public_only: bool) -> Option<String> {
    conversation
        .iter()
        .rev()
        .find(|entry| {
            entry.role == Role::Agent
                && !entry.message.trim().is_empty()
                && (!public_only || entry.public)
        })
        .map(|entry| entry.message.clone())
}

/// Projects a ticket's raw custom-field values through the schema into a
/// name-addressed map. Null and empty-string values are dropped; ids the
/// schema does not cover are emitted as `Field_<id>` with type unknown.
fn project_custom_fields(
    ticket: &Ticket,
    resolve: impl Fn(u64) -> Option<(String, String, Option<String>, Option<String>)>,
) -> BTreeMap<String, CustomField> {
    let mut projected = BTreeMap::new();

    for raw in &ticket.custom_fields {
        if raw.value.is_null() {
            continue;
        }
        if matches!(&raw.value, Value::String(s) if s.is_empty()) {
            continue;
        }

        let (title, type_tag, key, description) = match resolve(raw.id) {
            Some(found) => found,
            None => (format!("Field_{}", raw.id), "unknown".to_string(), None, None),
        };

        let field_type = FieldType::from_platform(&type_tag);

        projected.insert(
            title,
            CustomField {
                value: FieldValue::from_json(&raw.value, field_type),
                field_type,
                key,
                description,
            },
        );
    }

    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_connectors::testing::{sample_comment, sample_ticket, sample_ticket_with_fields};
    use tl_connectors::ticketing::MockTicketSource;
    use tl_connectors::{FieldDescriptor, TicketFieldValue};

    const REQUESTER: u64 = 9001;
    const AGENT: u64 = 42;

    fn enricher_for(source: MockTicketSource) -> Arc<Enricher<MockTicketSource>> {
        let source = Arc::new(source);
        let registry = Arc::new(FieldRegistry::new(Arc::clone(&source)));
        Arc::new(Enricher::new(source, registry))
    }

    #[test]
    fn test_role_classification() {
        let comments = vec![
            sample_comment(1, REQUESTER, "it broke", true),
            sample_comment(2, AGENT, "try rebooting", true),
            sample_comment(3, 77, "escalating", false),
        ];

        let conversation = build_conversation(&comments, REQUESTER);
        assert_eq!(conversation[0].role, Role::Customer);
        assert_eq!(conversation[1].role, Role::Agent);
        // Any non-requester author is an agent
        assert_eq!(conversation[2].role, Role::Agent);
        assert!(!conversation[2].public);
    }

    #[test]
    fn test_resolution_is_last_nonempty_agent_message() {
        let comments = vec![
            sample_comment(1, REQUESTER, "it broke", true),
            sample_comment(2, AGENT, "try rebooting", true),
            sample_comment(3, AGENT, "fixed in v2.1", true),
            sample_comment(4, REQUESTER, "thanks!", true),
        ];

        let conversation = build_conversation(&comments, REQUESTER);
        assert_eq!(
            extract_resolution(&conversation, false),
            Some("fixed in v2.1".to_string())
        );
    }

    #[test]
    fn test_whitespace_only_agent_message_is_not_a_resolution() {
        let comments = vec![
            sample_comment(1, AGENT, "actual answer", true),
            sample_comment(2, AGENT, "   \n\t ", true),
        ];

        let conversation = build_conversation(&comments, REQUESTER);
        assert_eq!(
            extract_resolution(&conversation, false),
            Some("actual answer".to_string())
        );
    }

    #[test]
    fn test_no_agent_comments_means_no_resolution() {
        let comments = vec![sample_comment(1, REQUESTER, "anyone there?", true)];
        let conversation = build_conversation(&comments, REQUESTER);
        assert_eq!(extract_resolution(&conversation, false), None);
    }

    #[test]
    fn test_public_only_resolution_skips_private_comments() {
        let comments = vec![
            sample_comment(1, AGENT, "public answer", true),
            sample_comment(2, AGENT, "internal note", false),
        ];

        let conversation = build_conversation(&comments, REQUESTER);
        assert_eq!(
            extract_resolution(&conversation, false),
            Some("internal note".to_string())
        );
        assert_eq!(
            extract_resolution(&conversation, true),
            Some("public answer".to_string())
        );
    }

    #[tokio::test]
    async fn test_custom_field_projection() {
        let ticket = sample_ticket_with_fields(
            1,
            REQUESTER,
            "2024-06-01T10:00:00Z",
            vec![
                TicketFieldValue { id: 7, value: serde_json::json!("refund") },
                TicketFieldValue { id: 8, value: serde_json::json!(null) },
                TicketFieldValue { id: 9, value: serde_json::json!("") },
                TicketFieldValue { id: 555, value: serde_json::json!(3) },
            ],
        );

        let source = MockTicketSource::new()
            .with_ticket(ticket.clone(), vec![])
            .with_field(FieldDescriptor {
                id: 7,
                title: "Refund Type".to_string(),
                field_type: "tagger".to_string(),
                key: Some("refund_type".to_string()),
                description: Some("Kind of refund requested".to_string()),
            });
        let enricher = enricher_for(source);

        let enriched = enricher.enrich_ticket(&ticket).await.unwrap();

        // Null and empty values dropped
        assert_eq!(enriched.custom_fields.len(), 2);

        let refund = &enriched.custom_fields["Refund Type"];
        assert_eq!(refund.value, FieldValue::Text("refund".to_string()));
        assert_eq!(refund.field_type, FieldType::Select);
        assert_eq!(refund.key.as_deref(), Some("refund_type"));

        // Unresolved id emitted under a synthetic name with unknown type
        let unknown = &enriched.custom_fields["Field_555"];
        assert_eq!(unknown.field_type, FieldType::Unknown);
        assert_eq!(unknown.value, FieldValue::Number(3.0));
    }

    #[tokio::test]
    async fn test_enrich_all_isolates_per_ticket_failures() {
        let mut source = MockTicketSource::new();
        for id in 1..=10u64 {
            source = source.with_ticket(
                sample_ticket(id, REQUESTER, "2024-06-01T10:00:00Z"),
                vec![
                    sample_comment(id * 10, REQUESTER, "problem", true),
                    sample_comment(id * 10 + 1, AGENT, "solution", true),
                ],
            );
        }
        let source = source.failing_comments_for(4);

        let tickets: Vec<_> = (1..=10u64)
            .map(|id| sample_ticket(id, REQUESTER, "2024-06-01T10:00:00Z"))
            .collect();

        let enricher = enricher_for(source);
        let enriched = enricher.enrich_all(&tickets).await;

        // Ticket 4 dropped, the other nine retained in input order
        assert_eq!(enriched.len(), 9);
        assert_eq!(
            enriched.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 5, 6, 7, 8, 9, 10]
        );
        assert!(enriched.iter().all(|t| t.resolution.is_some()));
    }
}
