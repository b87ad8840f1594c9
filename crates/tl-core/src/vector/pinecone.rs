//! Pinecone vector store client.
//!
//! Data-plane operations (upsert, query, delete, stats) go to the index
//! host. Index creation needs the control plane, so `ensure_index` only
//! creates when a control-plane URL and index name are configured;
//! otherwise it verifies the existing index and fails fatally on a
//! dimension mismatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tl_connectors::{AuthConfig, ClientConfig, HttpClient, SecureString};
use tracing::{debug, info, instrument, warn};

use super::{
    IndexStats, MetadataFilter, QueryMatch, VectorMetadata, VectorRecord, VectorStore,
    VectorStoreError, VectorStoreResult, UPSERT_BATCH_SIZE,
};

/// Pinecone configuration.
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// API key (zeroized on drop).
    pub api_key: SecureString,
    /// Data-plane host of the index, e.g. `https://tickets-abc123.svc.pinecone.io`.
    pub index_host: String,
    /// Expected index dimension.
    pub dimension: usize,
    /// Namespace to read and write in; the default namespace when unset.
    pub namespace: Option<String>,
    /// Control-plane URL, required only for index creation.
    pub control_plane_url: Option<String>,
    /// Index name on the control plane, required only for index creation.
    pub index_name: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
}

impl PineconeConfig {
    pub fn new(
        api_key: impl Into<SecureString>,
        index_host: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            index_host: index_host.into(),
            dimension,
            namespace: None,
            control_plane_url: None,
            index_name: None,
            timeout_secs: 30,
            max_retries: 4,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_control_plane(
        mut self,
        url: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        self.control_plane_url = Some(url.into());
        self.index_name = Some(index_name.into());
        self
    }
}

/// Pinecone-backed [`VectorStore`].
#[derive(Debug)]
pub struct PineconeStore {
    config: PineconeConfig,
    client: HttpClient,
}

impl PineconeStore {
    pub fn new(config: PineconeConfig) -> VectorStoreResult<Self> {
        if config.api_key.is_empty() {
            return Err(VectorStoreError::Configuration(
                "vector store API key is required".to_string(),
            ));
        }

        let client_config = ClientConfig::new(
            "pinecone",
            config.index_host.clone(),
            AuthConfig::ApiKey {
                key: config.api_key.clone(),
                header_name: "Api-Key".to_string(),
            },
        )
        .with_timeout_secs(config.timeout_secs)
        .with_max_retries(config.max_retries);

        let client = HttpClient::new(client_config).map_err(VectorStoreError::from)?;

        info!(
            host = %config.index_host,
            dimension = config.dimension,
            "Pinecone client initialized"
        );

        Ok(Self { config, client })
    }

    fn namespace_value(&self) -> Value {
        match &self.config.namespace {
            Some(ns) => json!(ns),
            None => json!(""),
        }
    }

    /// Creates the index through the control plane (serverless, cosine).
    async fn create_index(&self) -> VectorStoreResult<()> {
        let (control_url, index_name) = match (
            &self.config.control_plane_url,
            &self.config.index_name,
        ) {
            (Some(url), Some(name)) => (url.clone(), name.clone()),
            _ => {
                return Err(VectorStoreError::Configuration(
                    "index is missing and no control plane is configured; \
                     create the index or set the control-plane URL and index name"
                        .to_string(),
                ))
            }
        };

        let control_config = ClientConfig::new(
            "pinecone-control",
            control_url,
            AuthConfig::ApiKey {
                key: self.config.api_key.clone(),
                header_name: "Api-Key".to_string(),
            },
        )
        .with_timeout_secs(self.config.timeout_secs)
        .with_max_retries(self.config.max_retries);
        let control = HttpClient::new(control_config).map_err(VectorStoreError::from)?;

        let body = json!({
            "name": index_name,
            "dimension": self.config.dimension,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
        });

        control.post("/indexes", &body).await.map_err(VectorStoreError::from)?;

        info!(
            index = %index_name,
            dimension = self.config.dimension,
            "Created index; the data-plane host may take a moment to come up"
        );
        Ok(())
    }

    fn filter_to_pinecone(filter: &MetadataFilter) -> Value {
        let clauses: serde_json::Map<String, Value> = filter
            .equals
            .iter()
            .map(|(key, value)| (key.clone(), json!({ "$eq": value })))
            .collect();
        Value::Object(clauses)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    /// Verifies the index dimension, creating the index when it is missing
    /// and a control plane is configured. A dimension mismatch is fatal.
    #[instrument(skip(self))]
    async fn ensure_index(&self) -> VectorStoreResult<()> {
        match self.stats().await {
            Ok(stats) => {
                if stats.dimension != self.config.dimension {
                    return Err(VectorStoreError::Configuration(format!(
                        "index dimension {} does not match configured dimension {}; \
                         delete and recreate the index",
                        stats.dimension, self.config.dimension
                    )));
                }
                debug!(dimension = stats.dimension, "Index dimension verified");
                Ok(())
            }
            Err(VectorStoreError::IndexNotFound(_)) => {
                warn!("Index not found, attempting creation");
                self.create_index().await
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> VectorStoreResult<usize> {
        let total_batches = records.len().div_ceil(UPSERT_BATCH_SIZE);
        let mut written = 0;

        for (i, batch) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let vectors: Vec<PineconeVector> = batch.iter().map(PineconeVector::from).collect();
            let body = json!({
                "vectors": vectors,
                "namespace": self.namespace_value(),
            });

            if let Err(e) = self.client.post("/vectors/upsert", &body).await {
                return Err(VectorStoreError::PartialBatchFailure {
                    failed_batch: i + 1,
                    total_batches,
                    committed: written,
                    source_message: e.to_string(),
                });
            }

            written += batch.len();
            debug!(batch = i + 1, total_batches, written, "Upserted batch");
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
        let mut body = json!({
            "vector": embedding,
            "topK": top_k,
            "includeMetadata": include_metadata,
            "namespace": self.namespace_value(),
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = Self::filter_to_pinecone(&filter);
        }

        let response: QueryResponse = self
            .client
            .post_json("/query", &body)
            .await
            .map_err(VectorStoreError::from)?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| QueryMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.map(|fields| VectorMetadata { fields }),
            })
            .collect())
    }

    async fn delete_all(&self) -> VectorStoreResult<()> {
        let body = json!({
            "deleteAll": true,
            "namespace": self.namespace_value(),
        });

        self.client
            .post("/vectors/delete", &body)
            .await
            .map_err(VectorStoreError::from)?;

        info!("Deleted all vectors");
        Ok(())
    }

    async fn stats(&self) -> VectorStoreResult<IndexStats> {
        let response: StatsResponse = self
            .client
            .post_json("/describe_index_stats", &json!({}))
            .await
            .map_err(VectorStoreError::from)?;

        Ok(IndexStats {
            dimension: response.dimension,
            index_fullness: response.index_fullness,
            vector_count: response.total_vector_count,
        })
    }

    async fn health_check(&self) -> bool {
        self.stats().await.is_ok()
    }
}

// Pinecone API types

#[derive(Debug, Serialize)]
struct PineconeVector {
    id: String,
    values: Vec<f32>,
    metadata: Value,
}

impl From<&VectorRecord> for PineconeVector {
    fn from(record: &VectorRecord) -> Self {
        Self {
            id: record.id.clone(),
            values: record.values.clone(),
            metadata: serde_json::to_value(&record.metadata).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    score: f32,
    metadata: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    dimension: usize,
    #[serde(default)]
    index_fullness: f32,
    #[serde(default)]
    total_vector_count: u64,
}
