//! OpenAI-style embedding client.
//!
//! Talks to a `POST /v1/embeddings` endpoint with retry, backoff, request
//! pacing, and a process-level content-keyed cache. Two identical texts
//! embed to the identical vector within a process without a second network
//! call.

use super::{
    truncate_for_embedding, CacheStats, Embedder, EmbeddingError, EmbeddingResult,
    MIN_REQUEST_INTERVAL,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tl_connectors::{AuthConfig, ClientConfig, HttpClient, RateLimitConfig, SecureString};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

/// Configuration for the OpenAI embedding client.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (zeroized on drop).
    pub api_key: SecureString,
    /// Model identifier.
    pub model: String,
    /// Expected output dimension; responses are validated against it.
    pub dimension: usize,
    /// API base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<SecureString>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            base_url: "https://api.openai.com".to_string(),
            timeout_secs: 60,
            max_retries: 4,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

type EmbeddingCache = Arc<RwLock<HashMap<String, Vec<f32>>>>;

/// Embedding client backed by an OpenAI-style HTTP API.
///
/// Cloning shares the underlying HTTP client and cache.
#[derive(Clone, Debug)]
pub struct OpenAiEmbedder {
    config: Arc<OpenAiConfig>,
    client: Arc<HttpClient>,
    /// Content-keyed cache: exact truncated text → vector. Unbounded until
    /// [`Self::clear_cache`] is called.
    cache: EmbeddingCache,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig) -> EmbeddingResult<Self> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::Configuration(
                "embedding API key is required".to_string(),
            ));
        }

        let client_config = ClientConfig::new(
            "openai-embeddings",
            config.base_url.clone(),
            AuthConfig::BearerToken {
                token: config.api_key.clone(),
            },
        )
        .with_timeout_secs(config.timeout_secs)
        .with_max_retries(config.max_retries);

        // The token bucket enforces the minimum inter-request pause
        let client = HttpClient::with_rate_limit(
            client_config,
            Some(RateLimitConfig::min_interval(MIN_REQUEST_INTERVAL)),
        )?;

        info!(model = %config.model, dimension = config.dimension, "Embedding client initialized");

        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Empties the content-keyed cache (test isolation, long-lived
    /// processes).
    pub fn clear_cache(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Entry count and a conservative memory estimate for the cache.
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.read().unwrap();
        let approx_bytes = cache
            .iter()
            .map(|(text, vector)| text.len() + vector.len() * std::mem::size_of::<f32>())
            .sum();
        CacheStats {
            entries: cache.len(),
            approx_bytes,
        }
    }

    /// Embeds texts with bounded concurrency, preserving input order.
    ///
    /// The shared token bucket still paces individual requests; this only
    /// overlaps their latencies. Fails fast like the sequential path.
    pub async fn embed_batch_concurrent(
        &self,
        texts: &[&str],
        max_concurrency: usize,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        let limit = max_concurrency.clamp(1, 5);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for (index, text) in texts.iter().enumerate() {
            let embedder = self.clone();
            let text = text.to_string();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let vector = embedder.embed(&text).await;
                (index, vector)
            });
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, vector) = joined
                .map_err(|e| EmbeddingError::Provider(format!("embedding task failed: {}", e)))?;
            results[index] = Some(vector?);
        }

        Ok(results.into_iter().flatten().collect())
    }

    async fn request_embedding(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let request = EmbeddingsRequest {
            model: &self.config.model,
            input: vec![text],
            encoding_format: "float",
        };

        let response: EmbeddingsResponse = self
            .client
            .post_json("/v1/embeddings", &request)
            .await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("response carried no embedding".to_string())
            })?;

        if embedding.len() != self.config.dimension {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected dimension {}, got {}",
                self.config.dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, text), fields(text_chars = text.chars().count()))]
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let text = truncate_for_embedding(text);

        if let Some(cached) = self.cache.read().unwrap().get(&text) {
            debug!("Embedding cache hit");
            return Ok(cached.clone());
        }

        let embedding = self.request_embedding(&text).await?;

        self.cache
            .write()
            .unwrap()
            .insert(text, embedding.clone());

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::BatchOptions;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DIM: usize = 8;

    fn test_embedder(server: &MockServer) -> OpenAiEmbedder {
        let config = OpenAiConfig::new("sk-test")
            .with_model("text-embedding-3-small", DIM)
            .with_base_url(server.uri());
        OpenAiEmbedder::new(config).unwrap()
    }

    fn embedding_body(value: f32) -> serde_json::Value {
        serde_json::json!({
            "data": [{"embedding": vec![value; DIM]}]
        })
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = OpenAiEmbedder::new(OpenAiConfig::new("")).unwrap_err();
        assert!(matches!(err, EmbeddingError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_embed_sends_model_and_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "encoding_format": "float"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(0.5)))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector.len(), DIM);
    }

    #[tokio::test]
    async fn test_cache_bypasses_network_on_repeat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(0.5)))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let first = embedder.embed("same text").await.unwrap();
        let second = embedder.embed("same text").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.cache_stats().entries, 1);
        assert!(embedder.cache_stats().approx_bytes > 0);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(0.5)))
            .expect(2)
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let first = embedder.embed("text").await.unwrap();
        embedder.clear_cache();
        assert_eq!(embedder.cache_stats().entries, 0);

        // Identical input still embeds to the identical vector
        let second = embedder.embed("text").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_429_then_success_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(0.25)))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let started = std::time::Instant::now();
        let vector = embedder.embed("rate limited once").await.unwrap();

        assert_eq!(vector.len(), DIM);
        // Slept at least the advertised Retry-After
        assert!(started.elapsed() >= std::time::Duration::from_secs(1));
        // The retry's result is cached like any success
        assert_eq!(embedder.cache_stats().entries, 1);
    }

    #[tokio::test]
    async fn test_model_not_found_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.5, 0.5]}]
            })))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_batch_failure_aborts_whole_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let err = embedder
            .embed_batch(&["a", "b"], &BatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Provider(_)));
    }

    #[tokio::test]
    async fn test_concurrent_batch_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(0.5)))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server);
        let texts = vec!["a", "b", "c", "d", "e", "f"];
        let vectors = embedder.embed_batch_concurrent(&texts, 5).await.unwrap();

        assert_eq!(vectors.len(), texts.len());
        assert!(vectors.iter().all(|v| v.len() == DIM));
    }
}
