//! Query worker binary
//!
//! Run with: cargo run -p ragflow --bin ragflow-worker -- --config ragflow.toml

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragflow::cache::AnswerCache;
use ragflow::config::RagflowConfig;
use ragflow::processing::{QueryConsumer, QueryPipeline};
use ragflow::providers::{OpenAiEmbedder, OpenAiLlm, QdrantSearch};
use ragflow::storage::Database;

#[derive(Parser)]
#[command(name = "ragflow-worker", about = "Queue-driven RAG query worker")]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RagflowConfig::load(path)?,
        None => RagflowConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!(
        "  - Embedding model: {} ({} dimensions)",
        config.embedding.model,
        config.embedding.dimensions
    );
    tracing::info!("  - Completion model: {}", config.llm.model);
    tracing::info!("  - Vector store: {}", config.vector_search.base_url);
    tracing::info!("  - Concurrency ceiling: {}", config.worker.concurrency);
    tracing::info!("  - Escalation threshold: {}", config.scoring.escalation_threshold);

    let database = Arc::new(Database::open(&config.database.path, config.database.pool_size)?);

    // Jobs stranded in flight by a previous process are observable but not
    // redelivered automatically; recovery is a documented limitation.
    let stalled = database.count_stalled_jobs()?;
    if stalled > 0 {
        tracing::warn!("{stalled} jobs were left in flight by a previous run and require redelivery");
    }

    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let vector_search = Arc::new(QdrantSearch::new(&config.vector_search)?);
    let llm = Arc::new(OpenAiLlm::new(&config.llm)?);
    let cache = Arc::new(AnswerCache::new(&config.cache));

    let pipeline = Arc::new(QueryPipeline::new(
        database.clone(),
        embedder,
        vector_search,
        llm,
        cache,
        &config,
    ));
    let consumer = QueryConsumer::new(database, pipeline, &config.worker);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    consumer.run(shutdown_rx).await;
    tracing::info!("Worker stopped");

    Ok(())
}
