//! Ticket Loom CLI
//!
//! Command-line interface for ingesting support tickets into the vector
//! knowledge base.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;

mod config;
mod logging;

use config::AppConfig;
use logging::LoggingConfig;
use tl_connectors::{Connector, ZendeskConfig, ZendeskConnector};
use tl_core::{
    IngestionPipeline, MetadataFilter, OpenAiConfig, OpenAiEmbedder, PipelineConfig,
    PineconeConfig, PineconeStore, VectorStore,
};

#[derive(Parser)]
#[command(name = "ticket-loom")]
#[command(version)]
#[command(about = "Ingest support tickets into a vector knowledge base", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest tickets created in a date range (inclusive on both ends)
    Ingest {
        /// First creation date to include (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last creation date to include (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Pin the run timestamp to overwrite a prior run's vectors
        #[arg(long)]
        run_timestamp: Option<u64>,

        /// Only treat public agent comments as resolutions
        #[arg(long)]
        public_resolutions: bool,
    },

    /// Query the knowledge base for chunks similar to a question
    Search {
        /// Query text
        query: String,

        /// Number of neighbors to return
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Restrict to one chunk type (overview, conversation, resolution, custom_fields)
        #[arg(long)]
        chunk_type: Option<String>,
    },

    /// Show index statistics and connector health
    Stats,

    /// Delete every vector in the index
    Purge {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = if cli.verbose {
        LoggingConfig::verbose()
    } else if cli.json_logs {
        LoggingConfig::json()
    } else {
        LoggingConfig::default()
    };
    logging::init_logging(logging);

    let config = AppConfig::from_env().context("configuration error")?;

    match cli.command {
        Commands::Ingest {
            start,
            end,
            run_timestamp,
            public_resolutions,
        } => ingest(&config, start, end, run_timestamp, public_resolutions).await,
        Commands::Search {
            query,
            top_k,
            chunk_type,
        } => search(&config, &query, top_k, chunk_type).await,
        Commands::Stats => stats(&config).await,
        Commands::Purge { yes } => purge(&config, yes).await,
    }
}

fn build_store(config: &AppConfig) -> Result<PineconeStore> {
    let mut pinecone = PineconeConfig::new(
        config.vector_store.api_key.clone(),
        config.vector_store.index_host.clone(),
        config.embedding.dimension,
    );
    if let Some(namespace) = &config.vector_store.namespace {
        pinecone = pinecone.with_namespace(namespace.clone());
    }
    if let (Some(url), Some(name)) = (
        &config.vector_store.control_plane_url,
        &config.vector_store.index_name,
    ) {
        pinecone = pinecone.with_control_plane(url.clone(), name.clone());
    }

    PineconeStore::new(pinecone).context("vector store initialization failed")
}

fn build_embedder(config: &AppConfig) -> Result<OpenAiEmbedder> {
    let openai = OpenAiConfig::new(config.embedding.api_key.clone()).with_model(
        config.embedding.model.clone(),
        config.embedding.dimension,
    );
    OpenAiEmbedder::new(openai).context("embedding client initialization failed")
}

fn build_ticketing(config: &AppConfig) -> Result<ZendeskConnector> {
    let ticketing = config.require_ticketing()?;
    let zendesk = ZendeskConfig::new(
        ticketing.subdomain.clone(),
        ticketing.email.clone(),
        ticketing.api_token.clone(),
    );
    ZendeskConnector::new(zendesk).context("ticketing connector initialization failed")
}

async fn ingest(
    config: &AppConfig,
    start: NaiveDate,
    end: NaiveDate,
    run_timestamp: Option<u64>,
    public_resolutions: bool,
) -> Result<()> {
    if start > end {
        bail!("start date {} is after end date {}", start, end);
    }

    let connector = Arc::new(build_ticketing(config)?);
    let embedder = Arc::new(build_embedder(config)?);
    let store = Arc::new(build_store(config)?);

    let pipeline = IngestionPipeline::new(
        Arc::clone(&connector),
        connector,
        embedder,
        store,
        PipelineConfig {
            public_resolutions_only: public_resolutions,
            ..Default::default()
        },
    );

    pipeline
        .ensure_ready()
        .await
        .context("startup checks failed")?;

    println!(
        "Ingesting tickets created {} through {}...",
        start.to_string().bold(),
        end.to_string().bold()
    );

    let summary = match run_timestamp {
        Some(ts) => pipeline.run_with_timestamp(start, end, ts).await,
        None => pipeline.run(start, end).await,
    };

    match summary {
        Ok(summary) => {
            println!("{} {}", "✓".green().bold(), summary.status.green());
            println!("  tickets:  {}", summary.tickets_processed);
            println!("  chunks:   {}", summary.total_chunks);
            println!("  duration: {:.2}s", summary.processing_time_secs);
            if let Some(id) = &summary.audit_record_id {
                println!("  audit:    {}", id);
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("{} {}", "✗".red().bold(), failure.to_string().red());
            if let Some(id) = &failure.audit_record_id {
                eprintln!("  failure audit record: {}", id);
            }
            Err(failure.into())
        }
    }
}

async fn search(
    config: &AppConfig,
    query: &str,
    top_k: usize,
    chunk_type: Option<String>,
) -> Result<()> {
    let embedder = build_embedder(config)?;
    let store = build_store(config)?;

    let embedding = tl_core::Embedder::embed(&embedder, query).await?;
    let filter = chunk_type.map(|t| MetadataFilter::new().field("type", t));
    let matches = store.query(&embedding, top_k, true, filter).await?;

    if matches.is_empty() {
        println!("{}", "No matches.".yellow());
        return Ok(());
    }

    for m in matches {
        let metadata = m.metadata.unwrap_or_default();
        println!(
            "{} {} (ticket {}, {})",
            format!("{:.3}", m.score).bold(),
            metadata.get_str("subject").unwrap_or("<no subject>"),
            metadata.get_i64("ticket_id").unwrap_or(0),
            metadata.get_str("type").unwrap_or("unknown"),
        );
        if let Some(text) = metadata.get_str("text") {
            let preview: String = text.chars().take(160).collect();
            println!("    {}", preview.dimmed());
        }
    }

    Ok(())
}

async fn stats(config: &AppConfig) -> Result<()> {
    let store = build_store(config)?;
    let stats = store.stats().await.context("index stats unavailable")?;

    println!("{}", "Index".bold());
    println!("  vectors:   {}", stats.vector_count);
    println!("  dimension: {}", stats.dimension);
    println!("  fullness:  {:.1}%", stats.index_fullness * 100.0);

    match build_ticketing(config) {
        Ok(connector) => {
            let healthy = connector.test_connection().await.unwrap_or(false);
            let label = if healthy {
                "reachable".green()
            } else {
                "unreachable".red()
            };
            println!("{} {}", "Ticketing:".bold(), label);
        }
        Err(_) => println!("{} {}", "Ticketing:".bold(), "not configured".yellow()),
    }

    Ok(())
}

async fn purge(config: &AppConfig, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to delete the index without --yes");
    }

    let store = build_store(config)?;
    store.delete_all().await.context("delete failed")?;
    println!("{}", "✓ Index emptied".green());

    Ok(())
}
