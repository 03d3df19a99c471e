use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use locarank_api::AppState;
use locarank_cache::{MemoryBackend, RecommendationCache};
use locarank_config::AppConfig;
use locarank_core::ProductType;
use locarank_embedding::EmbeddingService;
use locarank_index::VectorIndex;
use locarank_orchestration::{Orchestrator, TaskRunner, WorkflowHandler, vectorize_products};
use locarank_recommend::{Ranker, RecommendationEngine};
use locarank_repository::{PostgresRepository, SharedRepository};
use locarank_sentiment::SentimentService;

#[derive(Debug, Parser)]
#[command(
    name = "locarank",
    version,
    about = "Recommendation and courier-ranking service for the rental marketplace"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "locarank.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP edge together with the in-process worker pool.
    Serve,
    /// Run the worker pool and periodic health checks without the HTTP edge.
    Worker,
    /// Vectorize the product corpus into the index (bootstrap).
    Vectorize {
        #[arg(long, default_value = "vehicle")]
        product_type: String,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        /// Drop and recreate the collection before inserting.
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        recreate: bool,
    },
}

/// Every long-lived handle the service is built from.
struct Components {
    engine: RecommendationEngine,
    sentiment: SentimentService,
    embedder: EmbeddingService,
    index: VectorIndex,
    repository: SharedRepository,
}

fn build_components(config: &AppConfig) -> Result<Components> {
    let cache = Arc::new(RecommendationCache::new(
        Arc::new(MemoryBackend::new(config.cache.capacity)),
        config.cache.ttl_seconds,
        config.cache.sentiment_tolerance,
    ));
    let embedder = EmbeddingService::new(
        &config.models.embedding_model_path,
        config.models.embedding_dimension,
    );
    let index = VectorIndex::connect(
        &config.index.url,
        config.models.embedding_dimension,
        config.index.collection_vehicles.clone(),
    )?;
    let repository: SharedRepository = Arc::new(PostgresRepository::connect(&config.database)?);
    let ranker = Ranker::new(
        config.ranking.similarity_weight,
        config.ranking.availability_weight,
        config.ranking.reputation_weight,
    )?;

    let engine = RecommendationEngine::new(
        cache,
        Arc::new(embedder.clone()),
        Arc::new(index.clone()),
        Arc::clone(&repository),
        ranker,
    );
    let sentiment = SentimentService::new(&config.models.sentiment_model_path);

    Ok(Components { engine, sentiment, embedder, index, repository })
}

fn start_runner(config: &AppConfig, components: &Components) -> TaskRunner {
    let handler = WorkflowHandler {
        engine: components.engine.clone(),
        sentiment: components.sentiment.clone(),
        embedder: components.embedder.clone(),
        index: components.index.clone(),
        repository: Arc::clone(&components.repository),
    };
    TaskRunner::start(Arc::new(handler), config.tasks.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOCARANK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let components = build_components(&config)?;
            let runner = start_runner(&config, &components);
            let orchestrator = Orchestrator::new(
                components.engine.clone(),
                components.sentiment.clone(),
                runner,
            );
            let state = Arc::new(AppState::new(config, orchestrator, components.index.clone()));
            locarank_api::serve(state).await
        }
        Commands::Worker => {
            let components = build_components(&config)?;
            let _runner = start_runner(&config, &components);
            tracing::info!(
                concurrency = config.tasks.worker_concurrency,
                "worker pool running; press ctrl-c to stop"
            );
            tokio::signal::ctrl_c().await?;
            Ok(())
        }
        Commands::Vectorize { product_type, batch_size, recreate } => {
            let product_type = ProductType::from_str(&product_type)?;
            let components = build_components(&config)?;
            let report = vectorize_products(
                &components.repository,
                &components.embedder,
                &components.index,
                product_type,
                batch_size,
                recreate,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
