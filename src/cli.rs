//! CLI argument parsing and help text

pub fn wants_help(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|a| a == "-h" || a == "--help" || a == "help")
}

pub fn wants_version(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|a| a == "-V" || a == "--version" || a == "version")
}

pub fn print_help() {
    println!("repo-kb-indexer");
    println!();
    println!("Indexes one parse-output JSON document into a relational, graph, and vector store.");
    println!();
    println!("Usage:");
    println!("  repo-kb-indexer <parse-output.json>");
    println!("  repo-kb-indexer --help");
    println!("  repo-kb-indexer --version");
    println!();
    println!("Common env (defaults shown):");
    println!("  DB_PATH=./.repo-kb/index.db");
    println!("  VECTOR_DB_PATH=./.repo-kb/vectors");
    println!("  REPO_ID, REPO_NAME, REPO_URL, BRANCH");
    println!("  BATCH_SIZE=100                        WORKER_COUNT=4");
    println!("  SKIP_VECTORS=false                    INCREMENTAL=false");
    println!("  USE_TRANSACTIONS=false                GRAPH_NAME=code_graph");
    println!("  EMBEDDING_MODEL=text-embedding-3-small EMBEDDING_ENDPOINT=https://api.openai.com/v1/embeddings");
    println!("  EMBEDDING_API_KEY=...                  EMBEDDING_DIMENSIONS=1536");
    println!("  MAX_RETRIES=3  MAX_REQUESTS_PER_SECOND=10  TIMEOUT_MS=30000");
    println!("  LOG_FILTER=info");
}

pub fn print_version() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}
