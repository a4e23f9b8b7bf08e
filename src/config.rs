//! Runtime configuration (§6.3). `Config::from_env()` mirrors the teacher's
//! `required_env`/`optional_env`/`parse_bool`/`parse_usize` helper style;
//! `Config::default()`/the builder methods cover programmatic construction
//! for tests and library callers.

use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub repo_id: Option<String>,
    pub repo_name: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,

    pub batch_size: usize,
    pub worker_count: usize,
    pub skip_vectors: bool,
    pub incremental: bool,
    pub use_transactions: bool,
    pub graph_name: String,

    pub embedding_model: String,
    pub embedding_endpoint: String,
    pub embedding_api_key: Option<String>,
    pub embedding_dimensions: usize,

    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub max_requests_per_second: f64,
    pub timeout: Duration,

    pub db_path: PathBuf,
    pub vector_db_path: PathBuf,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_id: None,
            repo_name: None,
            repo_url: None,
            branch: None,
            batch_size: 100,
            worker_count: 4,
            skip_vectors: false,
            incremental: false,
            use_transactions: false,
            graph_name: "code_graph".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            embedding_api_key: None,
            embedding_dimensions: 1536,
            max_retries: 3,
            base_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(5),
            max_requests_per_second: 10.0,
            timeout: Duration::from_secs(30),
            db_path: PathBuf::from("./.repo-kb/index.db"),
            vector_db_path: PathBuf::from("./.repo-kb/vectors"),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        config.repo_id = optional_env("REPO_ID");
        config.repo_name = optional_env("REPO_NAME");
        config.repo_url = optional_env("REPO_URL");
        config.branch = optional_env("BRANCH");

        if let Some(raw) = optional_env("BATCH_SIZE") {
            config.batch_size = parse_usize(&raw)?;
        }
        if let Some(raw) = optional_env("WORKER_COUNT") {
            config.worker_count = parse_usize(&raw)?;
        }
        if let Some(raw) = optional_env("SKIP_VECTORS") {
            config.skip_vectors = parse_bool(&raw)?;
        }
        if let Some(raw) = optional_env("INCREMENTAL") {
            config.incremental = parse_bool(&raw)?;
        }
        if let Some(raw) = optional_env("USE_TRANSACTIONS") {
            config.use_transactions = parse_bool(&raw)?;
        }
        if let Some(raw) = optional_env("GRAPH_NAME") {
            config.graph_name = raw;
        }

        if let Some(raw) = optional_env("EMBEDDING_MODEL") {
            config.embedding_model = raw;
        }
        if let Some(raw) = optional_env("EMBEDDING_ENDPOINT") {
            config.embedding_endpoint = raw;
        }
        config.embedding_api_key = optional_env("EMBEDDING_API_KEY");
        if let Some(raw) = optional_env("EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = parse_usize(&raw)?;
        }

        if let Some(raw) = optional_env("MAX_RETRIES") {
            config.max_retries = parse_usize(&raw)? as u32;
        }
        if let Some(raw) = optional_env("BASE_RETRY_DELAY_MS") {
            config.base_retry_delay = Duration::from_millis(parse_usize(&raw)? as u64);
        }
        if let Some(raw) = optional_env("MAX_RETRY_DELAY_MS") {
            config.max_retry_delay = Duration::from_millis(parse_usize(&raw)? as u64);
        }
        if let Some(raw) = optional_env("MAX_REQUESTS_PER_SECOND") {
            config.max_requests_per_second = parse_f64(&raw)?;
        }
        if let Some(raw) = optional_env("TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_usize(&raw)? as u64);
        }

        if let Some(raw) = optional_env("DB_PATH") {
            config.db_path = PathBuf::from(raw);
        }
        if let Some(raw) = optional_env("VECTOR_DB_PATH") {
            config.vector_db_path = PathBuf::from(raw);
        }
        if let Some(raw) = optional_env("LOG_FILTER") {
            config.log_filter = raw;
        }

        Ok(config)
    }
}

pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn repo_id(mut self, repo_id: impl Into<String>) -> Self {
        self.0.repo_id = Some(repo_id.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.0.batch_size = batch_size;
        self
    }

    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.0.worker_count = worker_count;
        self
    }

    pub fn skip_vectors(mut self, skip_vectors: bool) -> Self {
        self.0.skip_vectors = skip_vectors;
        self
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.0.incremental = incremental;
        self
    }

    pub fn use_transactions(mut self, use_transactions: bool) -> Self {
        self.0.use_transactions = use_transactions;
        self
    }

    pub fn db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.0.db_path = db_path.into();
        self
    }

    pub fn vector_db_path(mut self, vector_db_path: impl Into<PathBuf>) -> Self {
        self.0.vector_db_path = vector_db_path.into();
        self
    }

    pub fn embedding_dimensions(mut self, dim: usize) -> Self {
        self.0.embedding_dimensions = dim;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

fn parse_usize(value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|err| anyhow!("invalid integer '{value}': {err}"))
}

fn parse_f64(value: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|err| anyhow!("invalid float '{value}': {err}"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        other => Err(anyhow!("invalid boolean '{other}'")),
    }
}
