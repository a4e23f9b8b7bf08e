//! Tagged error model shared by every pipeline stage.
//!
//! Internal code uses `anyhow::Result` with `.context(...)` the way the rest
//! of the crate does; `IndexError` is the boundary type returned to callers
//! of [`crate::orchestrator::Indexer`] and is what the `ErrorCollector`
//! accumulates for the final `IndexResult::errors`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Database,
    Graph,
    Embedding,
    Transaction,
    NotFound,
    Conflict,
    Timeout,
    Connection,
}

impl ErrorKind {
    /// Default retryability for kinds that don't take a caller-specified value.
    fn default_retryable(self) -> Option<bool> {
        match self {
            ErrorKind::Validation | ErrorKind::Transaction | ErrorKind::NotFound | ErrorKind::Conflict => {
                Some(false)
            }
            ErrorKind::Graph | ErrorKind::Timeout | ErrorKind::Connection => Some(true),
            ErrorKind::Database | ErrorKind::Embedding => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Database => "database",
            ErrorKind::Graph => "graph",
            ErrorKind::Embedding => "embedding",
            ErrorKind::Transaction => "transaction",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexError {
    pub kind: ErrorKind,
    pub message: String,
    pub entity_id: Option<String>,
    pub file_path: Option<String>,
    pub retryable: bool,
}

impl IndexError {
    /// Build an error, resolving retryability from the kind's default when
    /// the kind doesn't need a caller-specified value (database/embedding do).
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = kind.default_retryable().unwrap_or(false);
        Self {
            kind,
            message: message.into(),
            entity_id: None,
            file_path: None,
            retryable,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn database(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(ErrorKind::Database, message).with_retryable(retryable)
    }

    pub fn embedding(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(ErrorKind::Embedding, message).with_retryable(retryable)
    }

    /// Classify a raw database/transport error message against known
    /// transient indicators. Mirrors the substring heuristic the writer and
    /// embedder both use to decide whether a failed batch is worth retrying.
    pub fn is_transient_message(message: &str) -> bool {
        const INDICATORS: &[&str] = &[
            "connection refused",
            "connection reset",
            "connection timeout",
            "connection lost",
            "broken pipe",
            "temporary",
            "deadlock",
            "lock timeout",
            "server overload",
            "timed out",
        ];
        let lower = message.to_ascii_lowercase();
        INDICATORS.iter().any(|needle| lower.contains(needle))
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for IndexError {}

/// Thread-safe accumulator for non-fatal errors collected across a run.
#[derive(Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<IndexError>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: IndexError) {
        self.errors.lock().expect("error collector mutex poisoned").push(error);
    }

    pub fn extend(&self, errors: impl IntoIterator<Item = IndexError>) {
        self.errors
            .lock()
            .expect("error collector mutex poisoned")
            .extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().expect("error collector mutex poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().expect("error collector mutex poisoned").len()
    }

    pub fn has_non_retryable(&self) -> bool {
        self.errors
            .lock()
            .expect("error collector mutex poisoned")
            .iter()
            .any(|e| !e.retryable)
    }

    pub fn into_vec(self) -> Vec<IndexError> {
        self.errors.into_inner().expect("error collector mutex poisoned")
    }

    pub fn snapshot(&self) -> Vec<IndexError> {
        self.errors.lock().expect("error collector mutex poisoned").clone()
    }

    /// Group collected errors by kind, for `IndexResult::summary`.
    pub fn summary(&self) -> std::collections::HashMap<String, u64> {
        let mut out = std::collections::HashMap::new();
        for err in self.errors.lock().expect("error collector mutex poisoned").iter() {
            *out.entry(err.kind.to_string()).or_insert(0u64) += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryability_matches_table() {
        assert!(!IndexError::new(ErrorKind::Validation, "x").retryable);
        assert!(!IndexError::new(ErrorKind::Transaction, "x").retryable);
        assert!(!IndexError::new(ErrorKind::NotFound, "x").retryable);
        assert!(!IndexError::new(ErrorKind::Conflict, "x").retryable);
        assert!(IndexError::new(ErrorKind::Graph, "x").retryable);
        assert!(IndexError::new(ErrorKind::Timeout, "x").retryable);
        assert!(IndexError::new(ErrorKind::Connection, "x").retryable);
    }

    #[test]
    fn transient_message_heuristic() {
        assert!(IndexError::is_transient_message("Connection Refused by peer"));
        assert!(IndexError::is_transient_message("deadlock detected"));
        assert!(!IndexError::is_transient_message("unique constraint failed"));
    }

    #[test]
    fn collector_tracks_retryable_and_summary() {
        let collector = ErrorCollector::new();
        collector.push(IndexError::database("conn refused", true));
        collector.push(IndexError::new(ErrorKind::Graph, "bad vertex"));
        assert_eq!(collector.len(), 2);
        assert!(collector.has_non_retryable() == false);

        collector.push(IndexError::new(ErrorKind::Validation, "oops"));
        assert!(collector.has_non_retryable());

        let summary = collector.summary();
        assert_eq!(summary.get("database"), Some(&1));
        assert_eq!(summary.get("graph"), Some(&1));
        assert_eq!(summary.get("validation"), Some(&1));
    }
}
