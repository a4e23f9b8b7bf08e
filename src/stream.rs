//! Bounded-concurrency batch streaming over files/symbols/AST nodes (§4.4).
//!
//! Two independent limits gate in-flight work: a counting semaphore on
//! concurrent batch handlers, and a soft memory budget estimated from batch
//! contents. Neither limit blocks forever — both release as handlers finish.

use crate::cancel::CancellationToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const BYTES_PER_SYMBOL: usize = 1024;
pub const BYTES_PER_NODE_BASE: usize = 512;
pub const BYTES_PER_FILE_OVERHEAD: usize = 256;

pub struct StreamProcessor {
    semaphore: Arc<Semaphore>,
    soft_memory_limit: usize,
    in_flight_bytes: Arc<AtomicUsize>,
}

impl StreamProcessor {
    pub fn new(max_concurrent: usize, soft_memory_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            soft_memory_limit: soft_memory_limit.max(1),
            in_flight_bytes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn estimate_symbol_bytes(count: usize) -> usize {
        count * BYTES_PER_SYMBOL
    }

    pub fn estimate_node_bytes(node_text_lens: impl IntoIterator<Item = usize>) -> usize {
        node_text_lens
            .into_iter()
            .map(|len| BYTES_PER_NODE_BASE + len)
            .sum()
    }

    /// Splits `items` into fixed-size batches and drives `handler` over each,
    /// honoring the concurrency semaphore, soft memory budget, and
    /// cancellation. `estimate` sizes a batch in bytes for the budget check.
    pub async fn for_each_batch<T, F, Fut, E>(
        &self,
        items: Vec<T>,
        batch_size: usize,
        estimate: impl Fn(&[T]) -> usize,
        handler: F,
        cancel: &CancellationToken,
    ) -> Result<(), E>
    where
        T: Send + 'static,
        F: Fn(Vec<T>) -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
    {
        let batch_size = batch_size.max(1);
        let mut remaining = items;

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let take = batch_size.min(remaining.len());
            let batch: Vec<T> = remaining.drain(..take).collect();
            let batch_bytes = estimate(&batch);

            self.wait_for_memory_budget(batch_bytes, cancel).await;

            let _permit = self
                .semaphore
                .acquire()
                .await
                .expect("stream processor semaphore closed");

            self.in_flight_bytes.fetch_add(batch_bytes, Ordering::SeqCst);
            let result = handler(batch).await;
            self.in_flight_bytes.fetch_sub(batch_bytes, Ordering::SeqCst);

            result?;
        }

        Ok(())
    }

    async fn wait_for_memory_budget(&self, incoming_bytes: usize, cancel: &CancellationToken) {
        loop {
            let current = self.in_flight_bytes.load(Ordering::SeqCst);
            if current == 0 || current + incoming_bytes <= self.soft_memory_limit {
                break;
            }
            if current as f64 >= self.soft_memory_limit as f64 * 0.9 {
                tracing::debug!(
                    in_flight_bytes = current,
                    soft_limit = self.soft_memory_limit,
                    "memory pressure approaching soft limit"
                );
            }
            if cancel.is_cancelled() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}
