//! Decomposes enriched tickets into typed chunks for embedding.
//!
//! Chunking is deterministic: the same enriched ticket always yields the
//! same chunk list in the same order (overview, conversation parts,
//! resolution, custom fields). Every chunk's text carries the ticket id so
//! a retrieved chunk can be traced back without its metadata.

use crate::model::EnrichedTicket;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Character budget per chunk. With the conservative 4-chars-per-token
/// ratio this stays safely inside the embedding model's token limit.
pub const MAX_CHUNK_CHARS: usize = 4000;

/// Characters reserved for the " [Part k/N]" suffix on split conversation
/// parts; covers part counts up to five digits.
const PART_MARKER_RESERVE: usize = 16;

/// Semantic type of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Overview,
    Conversation,
    Resolution,
    CustomFields,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkKind::Overview => "overview",
            ChunkKind::Conversation => "conversation",
            ChunkKind::Resolution => "resolution",
            ChunkKind::CustomFields => "custom_fields",
        };
        write!(f, "{}", s)
    }
}

/// Structured metadata attached to a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub kind: ChunkKind,
    pub ticket_id: u64,
    pub subject: String,
    pub tags: Vec<String>,
    /// 1-indexed part number, set on conversation chunks.
    pub part: Option<u32>,
    /// Total parts for the conversation, set on conversation chunks.
    pub total_parts: Option<u32>,
    /// Number of custom fields rendered, set on custom-field chunks.
    pub field_count: Option<usize>,
}

impl ChunkMetadata {
    fn new(kind: ChunkKind, ticket: &EnrichedTicket) -> Self {
        Self {
            kind,
            ticket_id: ticket.id,
            subject: ticket.subject.clone(),
            tags: ticket.tags.clone(),
            part: None,
            total_parts: None,
            field_count: None,
        }
    }
}

/// A text fragment with structured metadata, the unit of embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Vector identifier for this chunk. The run timestamp disambiguates
    /// replays; a caller pinning the same timestamp overwrites the prior
    /// run's vectors.
    pub fn vector_id(&self, source_tag: &str, chunk_index: usize, run_timestamp: u64) -> String {
        format!(
            "{}-ticket-{}-chunk-{}-{}",
            source_tag, self.metadata.ticket_id, chunk_index, run_timestamp
        )
    }
}

/// Produces the ordered chunk list for an enriched ticket.
pub fn chunk_ticket(ticket: &EnrichedTicket) -> Vec<Chunk> {
    let mut chunks = vec![overview_chunk(ticket)];
    chunks.extend(conversation_chunks(ticket));
    if let Some(resolution) = &ticket.resolution {
        chunks.push(resolution_chunk(ticket, resolution));
    }
    if !ticket.custom_fields.is_empty() {
        chunks.push(custom_fields_chunk(ticket));
    }
    chunks
}

fn overview_chunk(ticket: &EnrichedTicket) -> Chunk {
    let mut lines = vec![
        format!("Ticket {}: {}", ticket.id, ticket.subject),
        format!("Description: {}", ticket.description),
        format!("Status: {}", ticket.status),
        format!("Priority: {}", ticket.priority.as_deref().unwrap_or("none")),
        format!("Tags: {}", ticket.tags.join(", ")),
    ];

    if !ticket.custom_fields.is_empty() {
        lines.push("Custom Fields:".to_string());
        for (name, field) in &ticket.custom_fields {
            lines.push(format!("{}: {}", name, field.value.render()));
        }
    }

    Chunk {
        text: lines.join("\n"),
        metadata: ChunkMetadata::new(ChunkKind::Overview, ticket),
    }
}

fn conversation_chunks(ticket: &EnrichedTicket) -> Vec<Chunk> {
    if ticket.conversation.is_empty() {
        return Vec::new();
    }

    let header = format!("Ticket {} Conversation:", ticket.id);
    let body = ticket
        .conversation
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {}: {}", i + 1, entry.role, entry.message))
        .collect::<Vec<_>>()
        .join("\n");

    let single = format!("{}\n{}", header, body);
    if single.chars().count() <= MAX_CHUNK_CHARS {
        let mut metadata = ChunkMetadata::new(ChunkKind::Conversation, ticket);
        metadata.part = Some(1);
        metadata.total_parts = Some(1);
        return vec![Chunk { text: single, metadata }];
    }

    // The header repeats on every part so each chunk's text still names the
    // ticket; the body slices reassemble to the pre-split conversation.
    // The split budget reserves room for the header line and part marker so
    // the assembled text never exceeds MAX_CHUNK_CHARS.
    let budget = MAX_CHUNK_CHARS
        .saturating_sub(header.chars().count() + 1 + PART_MARKER_RESERVE)
        .max(1);
    let parts = split_at_chars(&body, budget);
    let total = parts.len() as u32;

    parts
        .into_iter()
        .enumerate()
        .map(|(i, slice)| {
            let part = i as u32 + 1;
            let mut metadata = ChunkMetadata::new(ChunkKind::Conversation, ticket);
            metadata.part = Some(part);
            metadata.total_parts = Some(total);
            Chunk {
                text: format!("{}\n{} [Part {}/{}]", header, slice, part, total),
                metadata,
            }
        })
        .collect()
}

fn resolution_chunk(ticket: &EnrichedTicket, resolution: &str) -> Chunk {
    let text = format!(
        "Ticket {} Resolution\nProblem: {}\nSolution: {}\nRelated Tags: {}",
        ticket.id,
        ticket.subject,
        resolution,
        ticket.tags.join(", ")
    );

    Chunk {
        text,
        metadata: ChunkMetadata::new(ChunkKind::Resolution, ticket),
    }
}

fn custom_fields_chunk(ticket: &EnrichedTicket) -> Chunk {
    let mut lines = vec![format!("Ticket {} Custom Fields:", ticket.id)];
    for (name, field) in &ticket.custom_fields {
        lines.push(format!(
            "{} ({}): {}",
            name,
            field.field_type,
            field.value.render()
        ));
    }

    let mut metadata = ChunkMetadata::new(ChunkKind::CustomFields, ticket);
    metadata.field_count = Some(ticket.custom_fields.len());

    Chunk {
        text: lines.join("\n"),
        metadata,
    }
}

/// Splits text into consecutive slices of at most `max_chars` characters,
/// on character boundaries.
fn split_at_chars(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            parts.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    if parts.is_empty() {
        parts.push(String::new());
    }
    parts
}
