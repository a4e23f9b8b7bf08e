//! Embedder (§4.9): composes embedding content for symbols, batches it to
//! an OpenAI-compatible HTTP endpoint, rate-limits and retries calls, and
//! persists results to the vector store. Grounded on the teacher's
//! `retrieval/hyde/generator.rs` reqwest client pattern — this is the
//! teacher's only HTTP-client precedent, since its own embedding backends
//! (fastembed/hash) run locally rather than over the network.

use crate::cancel::CancellationToken;
use crate::error::IndexError;
use crate::model::SymbolInput;
use crate::rate_limiter::RateLimiter;
use crate::store::{VectorRecord, VectorStore};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

pub struct EmbedderConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub request_timeout: Duration,
    pub max_requests_per_second: f64,
    pub worker_count: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct EmbedResult {
    pub vectors_created: u64,
    pub errors: Vec<IndexError>,
    pub duration: Duration,
}

pub struct Embedder {
    client: reqwest::Client,
    config: EmbedderConfig,
    rate_limiter: Arc<RateLimiter>,
    vector_store: Arc<dyn VectorStore>,
}

impl Embedder {
    pub fn new(config: EmbedderConfig, vector_store: Arc<dyn VectorStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build embedder http client")?;
        let rate_limiter = Arc::new(RateLimiter::new(config.max_requests_per_second, config.max_requests_per_second));
        Ok(Self {
            client,
            config,
            rate_limiter,
            vector_store,
        })
    }

    pub async fn embed_symbols(&self, symbols: &[SymbolInput], cancel: &CancellationToken) -> EmbedResult {
        let started = std::time::Instant::now();
        let mut vectors_created = 0u64;
        let mut errors = Vec::new();

        let embeddable: Vec<&SymbolInput> = symbols
            .iter()
            .filter(|s| !s.embedding_content().trim().is_empty())
            .collect();

        for chunk in embeddable.chunks(self.config.batch_size.max(1)) {
            if cancel.is_cancelled() {
                break;
            }

            let texts: Vec<String> = chunk.iter().map(|s| s.embedding_content()).collect();
            match self.batch_embed_with_retry(&texts, cancel).await {
                Ok(embeddings) => {
                    let mut records = Vec::new();
                    for (symbol, embedding) in chunk.iter().zip(embeddings.into_iter()) {
                        if embedding.len() != self.config.dimensions {
                            errors.push(
                                IndexError::embedding(
                                    format!(
                                        "embedding dimension mismatch: expected {}, got {}",
                                        self.config.dimensions,
                                        embedding.len()
                                    ),
                                    false,
                                )
                                .with_entity_id(symbol.symbol_id.clone()),
                            );
                            continue;
                        }
                        records.push(VectorRecord {
                            vector_id: format!("vec:{}", symbol.symbol_id),
                            entity_id: symbol.symbol_id.clone(),
                            entity_type: "symbol".to_string(),
                            embedding,
                            content: symbol.embedding_content(),
                            model: self.config.model.clone(),
                            chunk_index: 0,
                        });
                    }

                    let count = records.len() as u64;
                    if let Err(err) = self.vector_store.add_records(records).await {
                        errors.push(IndexError::embedding(err.to_string(), true));
                    } else {
                        vectors_created += count;
                    }
                }
                Err(err) => {
                    errors.push(IndexError::embedding(err.to_string(), IndexError::is_transient_message(&err.to_string())));
                }
            }
        }

        EmbedResult {
            vectors_created,
            errors,
            duration: started.elapsed(),
        }
    }

    /// Partitions symbols into roughly equal chunks across `worker_count`
    /// and embeds each chunk concurrently, merging results under a mutex.
    pub async fn embed_symbols_parallel(self: &Arc<Self>, symbols: Vec<SymbolInput>, cancel: &CancellationToken) -> EmbedResult {
        if self.config.worker_count <= 1 || symbols.len() <= 1 {
            return self.embed_symbols(&symbols, cancel).await;
        }

        let worker_count = self.config.worker_count.min(symbols.len().max(1));
        let chunk_size = symbols.len().div_ceil(worker_count).max(1);
        let merged = Arc::new(Mutex::new((0u64, Vec::new(), Duration::ZERO)));
        let mut handles = Vec::new();

        for chunk in symbols.chunks(chunk_size) {
            let embedder = self.clone();
            let chunk = chunk.to_vec();
            let cancel = cancel.clone();
            let merged = merged.clone();
            handles.push(tokio::spawn(async move {
                let result = embedder.embed_symbols(&chunk, &cancel).await;
                let mut guard = merged.lock().await;
                guard.0 += result.vectors_created;
                guard.1.extend(result.errors);
                guard.2 = guard.2.max(result.duration);
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let (vectors_created, errors, duration) = Arc::try_unwrap(merged)
            .map(|m| m.into_inner())
            .unwrap_or_else(|_| (0, Vec::new(), Duration::ZERO));

        EmbedResult { vectors_created, errors, duration }
    }

    async fn batch_embed_with_retry(&self, texts: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                anyhow::bail!("embedding request cancelled");
            }

            self.rate_limiter.acquire().await;

            match self.call_endpoint(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(err) => {
                    let retryable = IndexError::is_transient_message(&err.to_string());
                    if !retryable || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    let delay = self
                        .config
                        .base_retry_delay
                        .saturating_mul(1u32 << attempt.min(20))
                        .min(self.config.max_retry_delay);
                    sleep(delay).await;
                }
            }
        }
    }

    async fn call_endpoint(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut request = self.client.post(&self.config.endpoint).json(&serde_json::json!({
            "input": texts,
            "model": self.config.model,
        }));

        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.context("embedding http request failed")?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            anyhow::bail!("embedding endpoint returned temporary error: {status}");
        }
        if !status.is_success() {
            anyhow::bail!("embedding endpoint returned non-retryable error: {status}");
        }

        let parsed: EmbeddingResponse = response.json().await.context("failed to parse embedding response")?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Span;
    use crate::store::vector::LanceVectorStore;

    fn symbol(id: &str, content: &str) -> SymbolInput {
        SymbolInput {
            symbol_id: id.into(),
            file_id: "F1".into(),
            name: id.into(),
            kind: crate::model::SymbolKind::Function,
            signature: content.into(),
            span: Span { start_line: 1, end_line: 1, start_byte: 0, end_byte: 1 },
            docstring: None,
            semantic_summary: None,
        }
    }

    #[test]
    fn embedding_content_filters_out_blank_symbols() {
        let blank = symbol("S1", "");
        assert!(blank.embedding_content().is_empty());
    }

    async fn store(dim: usize) -> Arc<dyn VectorStore> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("repo-kb-indexer-embed-{nanos}"));
        Arc::new(LanceVectorStore::connect(&dir, "vectors", dim).await.unwrap())
    }

    #[tokio::test]
    async fn skips_symbols_with_empty_embedding_content() {
        let vector_store = store(3).await;
        let config = EmbedderConfig {
            endpoint: "http://127.0.0.1:0/embeddings".into(),
            model: "test-model".into(),
            api_key: None,
            dimensions: 3,
            batch_size: 10,
            max_retries: 0,
            base_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(10),
            request_timeout: Duration::from_millis(100),
            max_requests_per_second: 100.0,
            worker_count: 1,
        };
        let embedder = Embedder::new(config, vector_store).unwrap();
        let symbols = vec![symbol("S1", "")];
        let result = embedder.embed_symbols(&symbols, &CancellationToken::new()).await;
        assert_eq!(result.vectors_created, 0);
        assert!(result.errors.is_empty());
    }
}
