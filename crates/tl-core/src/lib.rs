//! # tl-core
//!
//! Ingestion core for Ticket Loom: pulls support tickets out of the
//! ticketing platform, enriches them with their conversations and typed
//! custom fields, decomposes them into chunks, embeds the chunks, and
//! upserts the vectors into the knowledge-base index. One audit record is
//! written per run.
//!
//! The externally visible entry point is [`ingest::IngestionPipeline`];
//! everything else is the machinery it is assembled from.

pub mod audit;
pub mod chunker;
pub mod embedding;
pub mod enrich;
pub mod fields;
pub mod ingest;
pub mod model;
pub mod vector;

pub use chunker::{chunk_ticket, Chunk, ChunkKind, ChunkMetadata, MAX_CHUNK_CHARS};
pub use embedding::{
    BatchOptions, CacheStats, Embedder, EmbeddingError, EmbeddingResult, MockEmbedder,
    OpenAiConfig, OpenAiEmbedder, SAFE_MAX_CHARS,
};
pub use enrich::Enricher;
pub use fields::FieldRegistry;
pub use ingest::{
    CancelHandle, IngestError, IngestFailure, IngestPhase, IngestionPipeline, IngestionSummary,
    PipelineConfig,
};
pub use model::{
    ConversationEntry, CustomField, EnrichedTicket, FieldType, FieldValue, Role,
};
pub use vector::{
    IndexStats, MetadataFilter, MockVectorStore, PineconeConfig, PineconeStore, QueryMatch,
    VectorMetadata, VectorRecord, VectorStore, VectorStoreError, UPSERT_BATCH_SIZE,
};
