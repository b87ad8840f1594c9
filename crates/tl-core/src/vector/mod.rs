//! Vector store abstraction for the ticket knowledge base.
//!
//! A trait-based interface over the vector index, with a Pinecone-style
//! HTTP implementation for production and an in-memory mock for tests.
//! Upserts are idempotent: writing a record with an existing identifier
//! overwrites it, which is what makes run replay safe.

mod error;
mod mock;
mod pinecone;
mod types;

pub use error::{VectorStoreError, VectorStoreResult};
pub use mock::MockVectorStore;
pub use pinecone::{PineconeConfig, PineconeStore};
pub use types::{IndexStats, MetadataFilter, QueryMatch, VectorMetadata, VectorRecord};

use async_trait::async_trait;

/// Vectors per write batch.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Trait for vector store implementations.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Verifies the index exists with the configured dimension, creating it
    /// when the deployment allows. A dimension mismatch is fatal: operators
    /// must delete and recreate the index.
    async fn ensure_index(&self) -> VectorStoreResult<()>;

    /// Writes records in batches of [`UPSERT_BATCH_SIZE`], sequentially.
    ///
    /// Returns the number of vectors written. A batch failure propagates an
    /// error; batches already written stay committed (at-least-once
    /// semantics, no rollback).
    async fn upsert(&self, records: Vec<VectorRecord>) -> VectorStoreResult<usize>;

    /// Returns the `top_k` nearest neighbors by cosine similarity,
    /// optionally constrained by metadata equality.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        include_metadata: bool,
        filter: Option<MetadataFilter>,
    ) -> VectorStoreResult<Vec<QueryMatch>>;

    /// Empties the index.
    async fn delete_all(&self) -> VectorStoreResult<()>;

    /// Index dimensionality, fullness, and vector count.
    async fn stats(&self) -> VectorStoreResult<IndexStats>;

    /// Whether the store is reachable.
    async fn health_check(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_store_roundtrip() {
        let store = MockVectorStore::new(4);
        store.ensure_index().await.unwrap();

        let records = vec![
            VectorRecord::new(
                "a",
                vec![1.0, 0.0, 0.0, 0.0],
                VectorMetadata::new().with_field("type", json!("overview")),
            ),
            VectorRecord::new(
                "b",
                vec![0.0, 1.0, 0.0, 0.0],
                VectorMetadata::new().with_field("type", json!("resolution")),
            ),
        ];

        let written = store.upsert(records).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.stats().await.unwrap().vector_count, 2);

        let matches = store
            .query(&[1.0, 0.0, 0.0, 0.0], 1, true, None)
            .await
            .unwrap();
        assert_eq!(matches[0].id, "a");

        store.delete_all().await.unwrap();
        assert_eq!(store.stats().await.unwrap().vector_count, 0);
    }
}
