//! Text embedding for ticket chunks.
//!
//! The [`Embedder`] trait abstracts the embedding model so the pipeline can
//! run against the OpenAI-style HTTP client in production and a
//! deterministic mock in tests.

mod openai;

pub use openai::{OpenAiConfig, OpenAiEmbedder};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tl_connectors::ConnectorError;
use tokio::time::sleep;

/// Maximum characters sent to the embedding provider. Text beyond this is
/// cut and marked; the chunker's budget should prevent reaching it.
pub const SAFE_MAX_CHARS: usize = 6000;

/// Appended to text that had to be cut at [`SAFE_MAX_CHARS`].
pub const TRUNCATION_MARKER: &str = "… [truncated]";

/// Minimum pause between embedding requests.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(20);

/// Error type for embedding operations.
#[derive(Debug, Error, Clone)]
pub enum EmbeddingError {
    /// The requested model does not exist. Never retried.
    #[error("embedding model not found: {0}")]
    ModelNotFound(String),

    /// Provider rate limit exhausted the retry budget.
    #[error("embedding rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Provider rejected the request.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// Network-level failure.
    #[error("embedding connection error: {0}")]
    Connection(String),

    #[error("embedding request timed out: {0}")]
    Timeout(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding configuration error: {0}")]
    Configuration(String),
}

impl From<ConnectorError> for EmbeddingError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::NotFound(msg) => EmbeddingError::ModelNotFound(msg),
            ConnectorError::RateLimited(secs) => EmbeddingError::RateLimited(secs),
            ConnectorError::ConnectionFailed(msg) => EmbeddingError::Connection(msg),
            ConnectorError::Timeout(msg) => EmbeddingError::Timeout(msg),
            ConnectorError::InvalidResponse(msg) => EmbeddingError::InvalidResponse(msg),
            ConnectorError::ConfigError(msg) => EmbeddingError::Configuration(msg),
            other => EmbeddingError::Provider(other.to_string()),
        }
    }
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Progress callback for batch embedding: (completed, total).
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Options for [`Embedder::embed_batch`].
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Items per batch before pausing; 0 falls back to the default.
    pub batch_size: usize,
    /// Pause after every `batch_size` items.
    pub inter_batch_delay: Option<Duration>,
    /// Invoked after each item completes.
    pub on_progress: Option<ProgressFn>,
}

impl BatchOptions {
    const DEFAULT_BATCH_SIZE: usize = 50;
    const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(2);

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = Some(delay);
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            Self::DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    fn effective_delay(&self) -> Duration {
        self.inter_batch_delay
            .unwrap_or(Self::DEFAULT_INTER_BATCH_DELAY)
    }
}

/// Statistics about an embedding cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached texts.
    pub entries: usize,
    /// Conservative estimate of cache memory in bytes.
    pub approx_bytes: usize,
}

/// Trait for embedding text into vectors.
///
/// Implementations are thread-safe and handle retry and rate limiting
/// internally.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single text into a vector of length [`Self::dimension`].
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embeds texts sequentially, preserving input order and length,
    /// pausing between batches. Fails fast: the first error aborts the
    /// whole batch.
    async fn embed_batch(
        &self,
        texts: &[&str],
        options: &BatchOptions,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        let batch_size = options.effective_batch_size();
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            results.push(self.embed(text).await?);

            if let Some(on_progress) = &options.on_progress {
                on_progress(i + 1, texts.len());
            }

            if (i + 1) % batch_size == 0 && i + 1 < texts.len() {
                sleep(options.effective_delay()).await;
            }
        }

        Ok(results)
    }

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Model identifier.
    fn model_id(&self) -> &str;
}

/// Cuts text at [`SAFE_MAX_CHARS`] characters, appending the truncation
/// marker when a cut happened.
pub fn truncate_for_embedding(text: &str) -> String {
    if text.chars().count() <= SAFE_MAX_CHARS {
        return text.to_string();
    }

    let mut cut: String = text.chars().take(SAFE_MAX_CHARS).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// A deterministic mock embedder for tests.
///
/// Identical texts always produce identical unit vectors.
pub struct MockEmbedder {
    dimension: usize,
    model_id: String,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: "mock-embedder".to_string(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of embed calls served.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            // LCG for deterministic pseudo-random values
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let value = ((seed as f64) / (u64::MAX as f64) * 2.0 - 1.0) as f32;
            embedding.push(value);
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut embedding {
                *v /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.generate(&truncate_for_embedding(text)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
