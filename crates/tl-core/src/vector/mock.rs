//! In-memory vector store for testing.
//!
//! Thread-safe, with cosine-similarity search and the same batch-splitting
//! behavior as the HTTP implementation so partial-failure semantics can be
//! exercised without a live index.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{
    IndexStats, MetadataFilter, QueryMatch, VectorRecord, VectorStore, VectorStoreError,
    VectorStoreResult, UPSERT_BATCH_SIZE,
};

/// In-memory mock vector store.
pub struct MockVectorStore {
    dimension: usize,
    vectors: RwLock<HashMap<String, VectorRecord>>,
    healthy: RwLock<bool>,
    /// When set, the Nth write batch (1-indexed) fails.
    fail_on_batch: Option<usize>,
    batches_written: AtomicUsize,
}

impl MockVectorStore {
    /// Creates a mock store with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: RwLock::new(HashMap::new()),
            healthy: RwLock::new(true),
            fail_on_batch: None,
            batches_written: AtomicUsize::new(0),
        }
    }

    /// Makes the Nth write batch (1-indexed) fail, for partial-failure
    /// tests.
    pub fn failing_on_batch(mut self, batch: usize) -> Self {
        self.fail_on_batch = Some(batch);
        self
    }

    /// Sets the simulated health status.
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.write().unwrap() = healthy;
    }

    /// Number of write batches accepted so far.
    pub fn batches_written(&self) -> usize {
        self.batches_written.load(Ordering::SeqCst)
    }

    /// Fetches a stored record by id.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.vectors.read().unwrap().get(id).cloned()
    }

    /// All stored ids, unordered.
    pub fn ids(&self) -> Vec<String> {
        self.vectors.read().unwrap().keys().cloned().collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn ensure_index(&self) -> VectorStoreResult<()> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> VectorStoreResult<usize> {
        let total_batches = records.len().div_ceil(UPSERT_BATCH_SIZE);
        let mut written = 0;

        for (i, batch) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let batch_number = i + 1;

            if self.fail_on_batch == Some(batch_number) {
                return Err(VectorStoreError::PartialBatchFailure {
                    failed_batch: batch_number,
                    total_batches,
                    committed: written,
                    source_message: "injected batch failure".to_string(),
                });
            }

            for record in batch {
                if record.values.len() != self.dimension {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected: self.dimension,
                        actual: record.values.len(),
                    });
                }
            }

            let mut vectors = self.vectors.write().unwrap();
            for record in batch {
                vectors.insert(record.id.clone(), record.clone());
            }
            written += batch.len();
            self.batches_written.fetch_add(1, Ordering::SeqCst);
        }

        Ok(written)
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        include_metadata: bool,
        filter: Option<MetadataFilter>,
    ) -> VectorStoreResult<Vec<QueryMatch>> {
        let vectors = self.vectors.read().unwrap();

        let mut matches: Vec<QueryMatch> = vectors
            .values()
            .filter(|record| {
                filter
                    .as_ref()
                    .map(|f| f.matches(&record.metadata))
                    .unwrap_or(true)
            })
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: Self::cosine_similarity(embedding, &record.values),
                metadata: include_metadata.then(|| record.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete_all(&self) -> VectorStoreResult<()> {
        self.vectors.write().unwrap().clear();
        Ok(())
    }

    async fn stats(&self) -> VectorStoreResult<IndexStats> {
        Ok(IndexStats {
            dimension: self.dimension,
            index_fullness: 0.0,
            vector_count: self.vectors.read().unwrap().len() as u64,
        })
    }

    async fn health_check(&self) -> bool {
        *self.healthy.read().unwrap()
    }
}
