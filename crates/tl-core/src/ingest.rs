//! The ingestion orchestrator.
//!
//! Ties the fetcher, enricher, chunker, embedder, and vector store into one
//! pipeline per run:
//!
//! ```text
//! FetchingFields → FetchingTickets → Enriching → Chunking
//!        → Embedding → Upserting → Auditing → Done | Failed
//! ```
//!
//! A run owns its intermediate collections and releases them on completion.
//! Enrichment failures are absorbed per ticket; a fatal error in any other
//! phase writes a best-effort failure audit record and surfaces to the
//! caller. Vector identifiers embed a run timestamp, so replaying a run
//! with a pinned timestamp overwrites its own vectors and nothing else.

use crate::audit::AuditRecorder;
use crate::chunker::{chunk_ticket, Chunk};
use crate::embedding::{BatchOptions, Embedder, EmbeddingError};
use crate::enrich::Enricher;
use crate::fields::FieldRegistry;
use crate::vector::{
    MetadataFilter, QueryMatch, VectorMetadata, VectorRecord, VectorStore, VectorStoreError,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tl_connectors::{ConnectorError, CustomObjectStore, TicketSource};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Pipeline phase, exposed for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Idle,
    FetchingFields,
    FetchingTickets,
    Enriching,
    Chunking,
    Embedding,
    Upserting,
    Auditing,
    Done,
    Failed,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestPhase::Idle => "idle",
            IngestPhase::FetchingFields => "fetching_fields",
            IngestPhase::FetchingTickets => "fetching_tickets",
            IngestPhase::Enriching => "enriching",
            IngestPhase::Chunking => "chunking",
            IngestPhase::Embedding => "embedding",
            IngestPhase::Upserting => "upserting",
            IngestPhase::Auditing => "auditing",
            IngestPhase::Done => "done",
            IngestPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("field schema load failed: {0}")]
    Fields(#[source] ConnectorError),

    #[error("ticket fetch failed: {0}")]
    Fetch(#[source] ConnectorError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store failed: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("run cancelled")]
    Cancelled,
}

/// Error envelope returned by a failed run: the first fatal error plus the
/// failure audit record id, when that write succeeded.
#[derive(Debug)]
pub struct IngestFailure {
    pub error: IngestError,
    pub audit_record_id: Option<String>,
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for IngestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result payload of a completed run.
#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub status: String,
    pub tickets_processed: usize,
    pub total_chunks: usize,
    /// Monotonic wall time, seconds with two decimals.
    pub processing_time_secs: f64,
    pub audit_record_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Tunables for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Provenance tag stored on every vector and audit record.
    pub source_tag: String,
    /// Chunks per embedding batch.
    pub embed_batch_size: usize,
    /// Pause between embedding batches.
    pub embed_inter_batch_delay: Duration,
    /// Restrict resolution extraction to public agent comments.
    pub public_resolutions_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_tag: "zendesk".to_string(),
            embed_batch_size: 50,
            embed_inter_batch_delay: Duration::from_secs(2),
            public_resolutions_only: false,
        }
    }
}

/// Handle for cooperative run cancellation. On cancel, the pipeline
/// finishes the batch in flight, writes a failure audit record, and
/// returns; committed vector batches are not rolled back.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The seven-phase ingestion pipeline.
pub struct IngestionPipeline<S, O, E, V> {
    enricher: Arc<Enricher<S>>,
    registry: Arc<FieldRegistry<S>>,
    source: Arc<S>,
    audit: AuditRecorder<O>,
    embedder: Arc<E>,
    store: Arc<V>,
    config: PipelineConfig,
    phase: RwLock<IngestPhase>,
    cancelled: Arc<AtomicBool>,
}

impl<S, O, E, V> IngestionPipeline<S, O, E, V>
where
    S: TicketSource + Send + Sync + 'static,
    O: CustomObjectStore,
    E: Embedder,
    V: VectorStore,
{
    pub fn new(
        source: Arc<S>,
        object_store: Arc<O>,
        embedder: Arc<E>,
        store: Arc<V>,
        config: PipelineConfig,
    ) -> Self {
        let registry = Arc::new(FieldRegistry::new(Arc::clone(&source)));
        let enricher = Arc::new(
            Enricher::new(Arc::clone(&source), Arc::clone(&registry))
                .public_resolutions(config.public_resolutions_only),
        );

        Self {
            enricher,
            registry,
            source,
            audit: AuditRecorder::new(object_store),
            embedder,
            store,
            config,
            phase: RwLock::new(IngestPhase::Idle),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current phase, for progress reporting.
    pub fn phase(&self) -> IngestPhase {
        *self.phase.read().unwrap()
    }

    /// Handle for cancelling the run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Startup readiness: the vector index must exist with the configured
    /// dimension (mismatch is fatal before any ingestion); the audit schema
    /// is ensured best-effort.
    pub async fn ensure_ready(&self) -> Result<(), IngestError> {
        self.store.ensure_index().await?;

        if let Err(e) = self.audit.ensure_schema().await {
            warn!(error = %e, "Audit schema bootstrap failed, audit writes may be skipped");
        }

        Ok(())
    }

    /// Runs ingestion for the inclusive date range, minting a fresh run
    /// timestamp (replays write new vectors).
    pub async fn run(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<IngestionSummary, IngestFailure> {
        let run_timestamp = Utc::now().timestamp_millis() as u64;
        self.run_with_timestamp(start, end, run_timestamp).await
    }

    /// Runs ingestion with a pinned run timestamp. Replaying with the same
    /// timestamp overwrites that run's vectors in place.
    #[instrument(skip(self), fields(source = %self.config.source_tag))]
    pub async fn run_with_timestamp(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        run_timestamp: u64,
    ) -> Result<IngestionSummary, IngestFailure> {
        let started = Instant::now();
        let range = Some((start, end));

        // Phase: field-map warmup
        self.set_phase(IngestPhase::FetchingFields);
        if let Err(e) = self.registry.get_fields().await {
            return Err(self.fail(IngestError::Fields(e), range).await);
        }

        // Phase: fetch
        self.check_cancelled(range).await?;
        self.set_phase(IngestPhase::FetchingTickets);
        let tickets = match self.source.search_created_between(start, end).await {
            Ok(tickets) => tickets,
            Err(e) => return Err(self.fail(IngestError::Fetch(e), range).await),
        };

        if tickets.is_empty() {
            self.set_phase(IngestPhase::Auditing);
            let audit_record_id = self
                .audit
                .record_success(range, 0, &self.config.source_tag)
                .await;
            self.set_phase(IngestPhase::Done);

            return Ok(IngestionSummary {
                status: "No tickets found in date range".to_string(),
                tickets_processed: 0,
                total_chunks: 0,
                processing_time_secs: elapsed_secs(started),
                audit_record_id,
                start_date: start,
                end_date: end,
            });
        }

        // Phase: enrich (per-ticket failures absorbed)
        self.check_cancelled(range).await?;
        self.set_phase(IngestPhase::Enriching);
        let enriched = self.enricher.enrich_all(&tickets).await;
        let skipped = tickets.len() - enriched.len();
        if skipped > 0 {
            warn!(skipped, "Some tickets were skipped during enrichment");
        }

        // Phase: chunk, in the fetcher's emission order
        self.check_cancelled(range).await?;
        self.set_phase(IngestPhase::Chunking);
        let imported_at = Utc::now().to_rfc3339();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut ids: Vec<String> = Vec::new();
        for ticket in &enriched {
            for (index, chunk) in chunk_ticket(ticket).into_iter().enumerate() {
                ids.push(chunk.vector_id(&self.config.source_tag, index, run_timestamp));
                chunks.push(chunk);
            }
        }
        info!(
            tickets = enriched.len(),
            chunks = chunks.len(),
            "Chunking complete"
        );

        // Phase: embed
        self.set_phase(IngestPhase::Embedding);
        let vectors = match self.embed_chunks(&chunks, range).await {
            Ok(vectors) => vectors,
            Err(failure) => return Err(failure),
        };

        // Phase: upsert
        self.check_cancelled(range).await?;
        self.set_phase(IngestPhase::Upserting);
        let records: Vec<VectorRecord> = ids
            .into_iter()
            .zip(chunks.iter().zip(vectors.into_iter()))
            .map(|(id, (chunk, values))| {
                VectorRecord::new(id, values, self.vector_metadata(chunk, &imported_at))
            })
            .collect();
        let total_chunks = records.len();

        if let Err(e) = self.store.upsert(records).await {
            return Err(self.fail(IngestError::VectorStore(e), range).await);
        }

        // Phase: audit
        self.set_phase(IngestPhase::Auditing);
        let audit_record_id = self
            .audit
            .record_success(range, enriched.len(), &self.config.source_tag)
            .await;

        self.set_phase(IngestPhase::Done);
        let summary = IngestionSummary {
            status: "Import completed".to_string(),
            tickets_processed: enriched.len(),
            total_chunks,
            processing_time_secs: elapsed_secs(started),
            audit_record_id,
            start_date: start,
            end_date: end,
        };

        info!(
            tickets = summary.tickets_processed,
            chunks = summary.total_chunks,
            seconds = summary.processing_time_secs,
            "Ingestion complete"
        );

        Ok(summary)
    }

    /// Embeds the query text and searches the index.
    pub async fn search_similar(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, IngestError> {
        let embedding = self.embedder.embed(query).await?;
        Ok(self.store.query(&embedding, top_k, true, filter).await?)
    }

    /// Embeds chunk texts in batches, checking for cancellation between
    /// batches and pausing per the configured inter-batch delay.
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<Vec<f32>>, IngestFailure> {
        let batch_size = self.config.embed_batch_size.max(1);
        let mut vectors = Vec::with_capacity(chunks.len());

        for slice in chunks.chunks(batch_size) {
            self.check_cancelled(range).await?;

            let texts: Vec<&str> = slice.iter().map(|c| c.text.as_str()).collect();
            // The slice is already one batch; no intra-call pauses
            let options = BatchOptions::default().with_batch_size(texts.len());

            match self.embedder.embed_batch(&texts, &options).await {
                Ok(mut batch_vectors) => vectors.append(&mut batch_vectors),
                Err(e) => return Err(self.fail(IngestError::Embedding(e), range).await),
            }

            info!(
                embedded = vectors.len(),
                total = chunks.len(),
                "Embedding progress"
            );

            if vectors.len() < chunks.len() {
                sleep(self.config.embed_inter_batch_delay).await;
            }
        }

        Ok(vectors)
    }

    /// Metadata for a chunk's vector: the chunk metadata plus ingestion
    /// provenance.
    fn vector_metadata(&self, chunk: &Chunk, imported_at: &str) -> VectorMetadata {
        let mut metadata = VectorMetadata::new()
            .with_field("type", json!(chunk.metadata.kind.to_string()))
            .with_field("ticket_id", json!(chunk.metadata.ticket_id))
            .with_field("subject", json!(chunk.metadata.subject))
            .with_field("tags", json!(chunk.metadata.tags))
            .with_field("text", json!(chunk.text))
            .with_field("source", json!(self.config.source_tag))
            .with_field("imported_at", json!(imported_at));

        if let (Some(part), Some(total)) = (chunk.metadata.part, chunk.metadata.total_parts) {
            metadata.set("part", json!(part));
            metadata.set("total_parts", json!(total));
        }
        if let Some(field_count) = chunk.metadata.field_count {
            metadata.set("field_count", json!(field_count));
        }

        metadata
    }

    fn set_phase(&self, phase: IngestPhase) {
        *self.phase.write().unwrap() = phase;
        info!(phase = %phase, "Pipeline phase");
    }

    async fn check_cancelled(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<(), IngestFailure> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(self.fail(IngestError::Cancelled, range).await)
        } else {
            Ok(())
        }
    }

    /// Terminal failure: best-effort failure audit write, then the error
    /// envelope.
    async fn fail(
        &self,
        error: IngestError,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> IngestFailure {
        self.set_phase(IngestPhase::Failed);

        let details = format!("{:?}", error);
        let audit_record_id = self
            .audit
            .record_failure(range, &error.to_string(), &details, &self.config.source_tag)
            .await;

        warn!(error = %error, audit_record_id = ?audit_record_id, "Ingestion failed");

        IngestFailure {
            error,
            audit_record_id,
        }
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    let secs = started.elapsed().as_secs_f64();
    ((secs * 100.0).round() / 100.0).max(0.01)
}
