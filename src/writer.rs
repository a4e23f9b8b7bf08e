//! Relational writer (§4.5): streams files/symbols/AST-nodes/edges through
//! the bounded-concurrency stream processor into the relational store,
//! topologically orders AST nodes first, and retries transient batch
//! failures with exponential backoff (outside of transactional mode, which
//! the orchestrator drives with retries disabled, per §4.5).

use crate::batch::BatchOptimizer;
use crate::cancel::CancellationToken;
use crate::error::IndexError;
use crate::model::{AstNodeInput, EdgeInput, FileInput, SymbolInput};
use crate::store::{BatchWriteResult, RelationalStore};
use crate::stream::StreamProcessor;
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;

pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32 << attempt.min(20));
        scaled.min(self.max_delay)
    }
}

pub struct RelationalWriter {
    store: Arc<dyn RelationalStore>,
    batch_size: usize,
    retry: RetryPolicy,
    symbol_batch_optimizer: AsyncMutex<BatchOptimizer>,
    stream: StreamProcessor,
}

impl RelationalWriter {
    pub fn new(store: Arc<dyn RelationalStore>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self::with_concurrency(store, batch_size, retry, 4, 64 * 1024 * 1024)
    }

    /// `max_concurrent` and `soft_memory_limit` (bytes) are forwarded to the
    /// stream processor (§4.4) driving every batch in this writer.
    pub fn with_concurrency(
        store: Arc<dyn RelationalStore>,
        batch_size: usize,
        retry: RetryPolicy,
        max_concurrent: usize,
        soft_memory_limit: usize,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            retry,
            symbol_batch_optimizer: AsyncMutex::new(BatchOptimizer::new(
                10,
                batch_size.max(10) * 4,
                batch_size.max(1),
                Duration::from_millis(250),
            )),
            stream: StreamProcessor::new(max_concurrent, soft_memory_limit),
        }
    }

    pub async fn write_files(&self, repo_id: &str, files: &[FileInput], cancel: &CancellationToken, retry: bool) -> Result<BatchWriteResult> {
        self.write_batched(
            files,
            self.batch_size,
            false,
            retry,
            |batch| batch.len() * crate::stream::BYTES_PER_FILE_OVERHEAD,
            cancel,
            |batch| {
                let store = self.store.clone();
                let repo_id = repo_id.to_string();
                let batch = batch.to_vec();
                async move { store.write_files(&repo_id, &batch).await }
            },
        )
        .await
    }

    pub async fn write_symbols(&self, repo_id: &str, symbols: &[SymbolInput], cancel: &CancellationToken, retry: bool) -> Result<BatchWriteResult> {
        let batch_size = self.symbol_batch_optimizer.lock().await.current_size();
        self.write_batched(
            symbols,
            batch_size,
            true,
            retry,
            |batch| StreamProcessor::estimate_symbol_bytes(batch.len()),
            cancel,
            |batch| {
                let store = self.store.clone();
                let repo_id = repo_id.to_string();
                let batch = batch.to_vec();
                async move { store.write_symbols(&repo_id, &batch).await }
            },
        )
        .await
    }

    pub async fn write_ast_nodes(&self, repo_id: &str, nodes: &[AstNodeInput], cancel: &CancellationToken, retry: bool) -> Result<BatchWriteResult> {
        let ordered = topological_sort(nodes);
        self.write_batched(
            &ordered,
            self.batch_size,
            false,
            retry,
            |batch| StreamProcessor::estimate_node_bytes(batch.iter().map(|n| n.text.len())),
            cancel,
            |batch| {
                let store = self.store.clone();
                let repo_id = repo_id.to_string();
                let batch = batch.to_vec();
                async move { store.write_ast_nodes(&repo_id, &batch).await }
            },
        )
        .await
    }

    pub async fn write_edges(&self, repo_id: &str, edges: &[EdgeInput], cancel: &CancellationToken, retry: bool) -> Result<BatchWriteResult> {
        self.write_batched(
            edges,
            self.batch_size,
            false,
            retry,
            |batch| batch.len() * crate::stream::BYTES_PER_FILE_OVERHEAD,
            cancel,
            |batch| {
                let store = self.store.clone();
                let repo_id = repo_id.to_string();
                let batch = batch.to_vec();
                async move { store.write_edges(&repo_id, &batch).await }
            },
        )
        .await
    }

    /// Drives `items` through the stream processor's bounded-concurrency,
    /// memory-budgeted batch loop (§4.4), retrying each batch per
    /// `retry`/`self.retry` and merging per-batch results into one total.
    #[allow(clippy::too_many_arguments)]
    async fn write_batched<T, F, Fut>(
        &self,
        items: &[T],
        batch_size: usize,
        track_for_optimizer: bool,
        retry: bool,
        estimate: impl Fn(&[T]) -> usize,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<BatchWriteResult>
    where
        T: Clone + Send + 'static,
        F: Fn(&[T]) -> Fut,
        Fut: std::future::Future<Output = Result<BatchWriteResult>>,
    {
        let batch_size = batch_size.max(1);
        let total = AsyncMutex::new(BatchWriteResult::default());

        self.stream
            .for_each_batch::<T, _, _, anyhow::Error>(
                items.to_vec(),
                batch_size,
                estimate,
                |batch| async {
                    let started = std::time::Instant::now();
                    let outcome = if retry {
                        self.attempt_with_retry(&batch, cancel, &call).await
                    } else {
                        call(&batch).await
                    };
                    let elapsed = started.elapsed();

                    match outcome {
                        Ok(result) => total.lock().await.merge(result),
                        Err(err) => total.lock().await.errors.push(IndexError::database(err.to_string(), false)),
                    }

                    if track_for_optimizer {
                        self.symbol_batch_optimizer.lock().await.record(elapsed);
                    }

                    Ok(())
                },
                cancel,
            )
            .await?;

        Ok(total.into_inner())
    }

    async fn attempt_with_retry<T, F, Fut>(&self, chunk: &[T], cancel: &CancellationToken, call: &F) -> Result<BatchWriteResult>
    where
        F: Fn(&[T]) -> Fut,
        Fut: std::future::Future<Output = Result<BatchWriteResult>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(BatchWriteResult::default());
            }

            let result = call(chunk).await?;
            let retryable_failure = result
                .errors
                .iter()
                .any(|e| e.retryable && IndexError::is_transient_message(&e.message));

            if !retryable_failure || attempt >= self.retry.max_retries {
                return Ok(result);
            }

            attempt += 1;
            sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }
}

/// Kahn's algorithm over `parent_id` edges (§4.5.1): every child is emitted
/// after its parent. Nodes left with unresolved in-degree (cycle or
/// dangling parent) are appended at the end rather than dropped.
pub fn topological_sort(nodes: &[AstNodeInput]) -> Vec<AstNodeInput> {
    let mut by_id: HashMap<&str, &AstNodeInput> = HashMap::new();
    for node in nodes {
        by_id.insert(node.node_id.as_str(), node);
    }

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, u32> = HashMap::new();

    for node in nodes {
        in_degree.entry(node.node_id.as_str()).or_insert(0);
        if let Some(parent_id) = node.parent_id.as_deref() {
            if !parent_id.is_empty() && by_id.contains_key(parent_id) {
                children.entry(parent_id).or_default().push(node.node_id.as_str());
                *in_degree.entry(node.node_id.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut ordered_ids = Vec::with_capacity(nodes.len());
    let mut visited = std::collections::HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        ordered_ids.push(id);
        if let Some(kids) = children.get(id) {
            for &child in kids {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    let mut ordered: Vec<AstNodeInput> = ordered_ids
        .into_iter()
        .filter_map(|id| by_id.get(id).map(|n| (*n).clone()))
        .collect();

    let visited_ids: std::collections::HashSet<&str> = ordered.iter().map(|n| n.node_id.as_str()).collect();
    for node in nodes {
        if !visited_ids.contains(node.node_id.as_str()) {
            ordered.push(node.clone());
        }
    }

    ordered
}
