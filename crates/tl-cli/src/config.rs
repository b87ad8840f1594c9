//! Environment-based configuration for the Ticket Loom CLI.
//!
//! Embedding and vector-store credentials are required: missing either
//! aborts startup. Ticketing credentials are checked only when a command
//! actually needs the ticketing platform, so read-only commands (`stats`,
//! `purge`) work without them.

use anyhow::{bail, Context, Result};
use tl_connectors::SecureString;

/// Names of the environment variables the CLI reads.
pub mod env_vars {
    pub const ZENDESK_SUBDOMAIN: &str = "ZENDESK_SUBDOMAIN";
    pub const ZENDESK_EMAIL: &str = "ZENDESK_EMAIL";
    pub const ZENDESK_API_TOKEN: &str = "ZENDESK_API_TOKEN";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
    pub const EMBEDDING_DIMENSION: &str = "EMBEDDING_DIMENSION";
    pub const PINECONE_API_KEY: &str = "PINECONE_API_KEY";
    pub const PINECONE_INDEX_HOST: &str = "PINECONE_INDEX_HOST";
    pub const PINECONE_NAMESPACE: &str = "PINECONE_NAMESPACE";
    pub const PINECONE_CONTROL_PLANE_URL: &str = "PINECONE_CONTROL_PLANE_URL";
    pub const PINECONE_INDEX_NAME: &str = "PINECONE_INDEX_NAME";
}

/// Ticketing platform credentials.
#[derive(Debug, Clone)]
pub struct TicketingEnv {
    pub subdomain: String,
    pub email: String,
    pub api_token: SecureString,
}

/// Embedding provider settings.
#[derive(Debug, Clone)]
pub struct EmbeddingEnv {
    pub api_key: SecureString,
    pub model: String,
    pub dimension: usize,
}

/// Vector store settings.
#[derive(Debug, Clone)]
pub struct VectorStoreEnv {
    pub api_key: SecureString,
    pub index_host: String,
    pub namespace: Option<String>,
    pub control_plane_url: Option<String>,
    pub index_name: Option<String>,
}

/// Full CLI configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Present only when all ticketing variables are set.
    pub ticketing: Option<TicketingEnv>,
    pub embedding: EmbeddingEnv,
    pub vector_store: VectorStoreEnv,
}

impl AppConfig {
    /// Loads configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let embedding = EmbeddingEnv {
            api_key: require_secret(env_vars::OPENAI_API_KEY)?,
            model: optional(env_vars::EMBEDDING_MODEL)
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimension: optional(env_vars::EMBEDDING_DIMENSION)
                .map(|raw| {
                    raw.parse::<usize>().with_context(|| {
                        format!("{} must be an integer", env_vars::EMBEDDING_DIMENSION)
                    })
                })
                .transpose()?
                .unwrap_or(1536),
        };

        let vector_store = VectorStoreEnv {
            api_key: require_secret(env_vars::PINECONE_API_KEY)?,
            index_host: require(env_vars::PINECONE_INDEX_HOST)?,
            namespace: optional(env_vars::PINECONE_NAMESPACE),
            control_plane_url: optional(env_vars::PINECONE_CONTROL_PLANE_URL),
            index_name: optional(env_vars::PINECONE_INDEX_NAME),
        };

        let ticketing = match (
            optional(env_vars::ZENDESK_SUBDOMAIN),
            optional(env_vars::ZENDESK_EMAIL),
            optional(env_vars::ZENDESK_API_TOKEN),
        ) {
            (Some(subdomain), Some(email), Some(token)) => Some(TicketingEnv {
                subdomain,
                email,
                api_token: SecureString::new(token),
            }),
            _ => None,
        };

        Ok(Self {
            ticketing,
            embedding,
            vector_store,
        })
    }

    /// The ticketing credentials, or a clean error naming what is missing.
    pub fn require_ticketing(&self) -> Result<&TicketingEnv> {
        self.ticketing.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "ticketing credentials are not configured; set {}, {}, and {}",
                env_vars::ZENDESK_SUBDOMAIN,
                env_vars::ZENDESK_EMAIL,
                env_vars::ZENDESK_API_TOKEN
            )
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn require(name: &str) -> Result<String> {
    match optional(name) {
        Some(value) => Ok(value),
        None => bail!("required environment variable {} is not set", name),
    }
}

fn require_secret(name: &str) -> Result<SecureString> {
    require(name).map(SecureString::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they
    // cannot race each other under the parallel test runner.
    #[test]
    fn test_from_env_paths() {
        let all = [
            env_vars::ZENDESK_SUBDOMAIN,
            env_vars::ZENDESK_EMAIL,
            env_vars::ZENDESK_API_TOKEN,
            env_vars::OPENAI_API_KEY,
            env_vars::EMBEDDING_MODEL,
            env_vars::EMBEDDING_DIMENSION,
            env_vars::PINECONE_API_KEY,
            env_vars::PINECONE_INDEX_HOST,
            env_vars::PINECONE_NAMESPACE,
            env_vars::PINECONE_CONTROL_PLANE_URL,
            env_vars::PINECONE_INDEX_NAME,
        ];
        for name in all {
            std::env::remove_var(name);
        }

        // Missing embedding credentials abort startup
        assert!(AppConfig::from_env().is_err());

        std::env::set_var(env_vars::OPENAI_API_KEY, "sk-test");
        std::env::set_var(env_vars::PINECONE_API_KEY, "pc-test");
        std::env::set_var(env_vars::PINECONE_INDEX_HOST, "https://idx.example.test");

        // Required pieces present, ticketing absent
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimension, 1536);
        assert!(config.ticketing.is_none());
        assert!(config.require_ticketing().is_err());

        // Dimension override must parse
        std::env::set_var(env_vars::EMBEDDING_DIMENSION, "not-a-number");
        assert!(AppConfig::from_env().is_err());
        std::env::set_var(env_vars::EMBEDDING_DIMENSION, "768");

        // Full ticketing credentials activate the connector config
        std::env::set_var(env_vars::ZENDESK_SUBDOMAIN, "acme");
        std::env::set_var(env_vars::ZENDESK_EMAIL, "agent@acme.test");
        std::env::set_var(env_vars::ZENDESK_API_TOKEN, "zd-token");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.embedding.dimension, 768);
        let ticketing = config.require_ticketing().unwrap();
        assert_eq!(ticketing.subdomain, "acme");

        for name in all {
            std::env::remove_var(name);
        }
    }
}
