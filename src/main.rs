//! repo-kb-indexer binary entry point.

use anyhow::{Context, Result};
use repo_kb_indexer::config::Config;
use repo_kb_indexer::model::{IndexStatus, ParseOutput};
use repo_kb_indexer::orchestrator::Indexer;
use repo_kb_indexer::store::graph::PetGraphStore;
use repo_kb_indexer::store::sqlite::SqliteStore;
use repo_kb_indexer::store::vector::LanceVectorStore;
use repo_kb_indexer::store::{GraphStore, RelationalStore, VectorStore};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = std::env::args().collect::<Vec<_>>();
    if cli::wants_help(&args) {
        cli::print_help();
        return Ok(());
    }
    if cli::wants_version(&args) {
        cli::print_version();
        return Ok(());
    }

    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting repo-kb-indexer");

    let input_path = args.get(1).context("usage: repo-kb-indexer <parse-output.json>")?;

    if let Err(err) = run(config, input_path).await {
        error!(error = %err, "index run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(config: Config, input_path: &str) -> Result<()> {
    let raw = tokio::fs::read_to_string(input_path)
        .await
        .with_context(|| format!("failed to read parse output: {input_path}"))?;
    let parse_output: ParseOutput = serde_json::from_str(&raw).context("failed to parse input document")?;

    let sqlite = SqliteStore::open(&config.db_path)?;
    sqlite.init().await?;
    let relational: Arc<dyn RelationalStore> = Arc::new(sqlite);

    let graph: Arc<dyn GraphStore> = Arc::new(PetGraphStore::new());

    let vector: Option<Arc<dyn VectorStore>> = if config.skip_vectors {
        None
    } else {
        let store = LanceVectorStore::connect(&config.vector_db_path, "symbols", config.embedding_dimensions).await?;
        Some(Arc::new(store))
    };

    let indexer = Indexer::new(config, relational, graph, vector)?;
    let result = indexer.index(parse_output).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.status == IndexStatus::Failed {
        anyhow::bail!("index run failed with {} error(s)", result.errors.len());
    }
    Ok(())
}
