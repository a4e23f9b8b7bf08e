//! End-to-end scenarios driving a real `Indexer` against in-memory/temp-dir
//! stores, covering the external-import, header/impl association, and
//! retryable-database-failure cases not already exercised by the
//! orchestrator's own unit tests.

use async_trait::async_trait;
use repo_kb_indexer::config::Config;
use repo_kb_indexer::error::IndexError;
use repo_kb_indexer::model::{
    EdgeInput, EdgeType, FileInput, IndexStatus, ParseMetadata, ParseOutput, Span, SymbolInput, SymbolKind,
};
use repo_kb_indexer::orchestrator::Indexer;
use repo_kb_indexer::store::graph::PetGraphStore;
use repo_kb_indexer::store::sqlite::SqliteStore;
use repo_kb_indexer::store::{BatchWriteResult, GraphStore, RelationalStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn tmp_dir(label: &str) -> std::path::PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let c = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("repo-kb-indexer-it-{label}-{nanos}-{c}"))
}

fn symbol(id: &str, file_id: &str, name: &str, kind: SymbolKind, signature: &str) -> SymbolInput {
    SymbolInput {
        symbol_id: id.into(),
        file_id: file_id.into(),
        name: name.into(),
        kind,
        signature: signature.into(),
        span: Span { start_line: 1, end_line: 5, start_byte: 0, end_byte: 50 },
        docstring: None,
        semantic_summary: None,
    }
}

fn parse_output(files: Vec<FileInput>, relationships: Vec<EdgeInput>) -> ParseOutput {
    let total = files.len() as u64;
    ParseOutput {
        metadata: ParseMetadata {
            total_files: total,
            success_count: total,
            failure_count: 0,
            ..Default::default()
        },
        files,
        relationships,
        repo_id: Some("R1".into()),
        repo_name: None,
        repo_url: None,
        branch: None,
        commit_hash: None,
    }
}

async fn sqlite_store() -> Arc<dyn RelationalStore> {
    let store = SqliteStore::from_connection(rusqlite::Connection::open_in_memory().unwrap());
    store.init().await.unwrap();
    Arc::new(store)
}

/// S5 — import edges with a `target_module` but no `target_id` resolve to a
/// deterministic synthetic symbol owned by the external-file sentinel.
#[tokio::test]
async fn external_import_closes_over_a_synthetic_symbol_and_graph_vertex() {
    let relational = sqlite_store().await;
    let graph: Arc<dyn GraphStore> = Arc::new(PetGraphStore::new());
    let indexer = Indexer::new(Config::builder().skip_vectors(true).build(), relational, graph.clone(), None).unwrap();

    let output = parse_output(
        vec![FileInput {
            file_id: "F1".into(),
            path: "main.go".into(),
            language: "go".into(),
            size: 42,
            checksum: "c1".into(),
            symbols: vec![symbol("S1", "F1", "main", SymbolKind::Function, "func main()")],
            nodes: vec![],
        }],
        vec![EdgeInput {
            edge_id: "E1".into(),
            source_id: "S1".into(),
            target_id: None,
            edge_type: EdgeType::Import,
            source_file: Some("main.go".into()),
            target_file: None,
            target_module: Some("fmt".into()),
        }],
    );

    let result = indexer.index(output).await;
    assert_eq!(result.status, IndexStatus::Success, "{:?}", result.errors);
    assert_eq!(result.edges_created, 1);
    assert_eq!(result.symbols_created, 2);
    assert_eq!(graph.vertex_count("code_graph").await.unwrap(), 2);
    assert_eq!(graph.edge_count("code_graph").await.unwrap(), 1);
}

/// S6 — a header/implementation pair in the same directory produces exactly
/// one `implements_header` edge and one `implements_declaration` edge.
#[tokio::test]
async fn header_and_implementation_files_are_associated() {
    let relational = sqlite_store().await;
    let graph: Arc<dyn GraphStore> = Arc::new(PetGraphStore::new());
    let indexer = Indexer::new(Config::builder().skip_vectors(true).build(), relational, graph, None).unwrap();

    let output = parse_output(
        vec![
            FileInput {
                file_id: "H1".into(),
                path: "src/test.h".into(),
                language: "c".into(),
                size: 10,
                checksum: "ch".into(),
                symbols: vec![symbol(
                    "HS1",
                    "H1",
                    "myFunction",
                    SymbolKind::Interface,
                    "int myFunction(int x)",
                )],
                nodes: vec![],
            },
            FileInput {
                file_id: "C1".into(),
                path: "src/test.c".into(),
                language: "c".into(),
                size: 20,
                checksum: "cc".into(),
                symbols: vec![symbol(
                    "CS1",
                    "C1",
                    "myFunction",
                    SymbolKind::Function,
                    "int myFunction(int x)",
                )],
                nodes: vec![],
            },
        ],
        vec![],
    );

    let result = indexer.index(output).await;
    assert_eq!(result.status, IndexStatus::Success, "{:?}", result.errors);
    assert_eq!(result.edges_created, 2, "expected one implements_header and one implements_declaration edge");
}

/// S7 — a relational store that fails the first two symbol batches with a
/// transient error and succeeds on the third still reports the symbols as
/// written, with no error collected.
struct FlakyRelationalStore {
    inner: SqliteStore,
    symbol_write_attempts: AtomicU64,
}

#[async_trait]
impl RelationalStore for FlakyRelationalStore {
    async fn ensure_repository(
        &self,
        repo_id: &str,
        repo_name: Option<&str>,
        repo_url: Option<&str>,
        branch: Option<&str>,
    ) -> anyhow::Result<()> {
        self.inner.ensure_repository(repo_id, repo_name, repo_url, branch).await
    }

    async fn write_files(&self, repo_id: &str, files: &[FileInput]) -> anyhow::Result<BatchWriteResult> {
        self.inner.write_files(repo_id, files).await
    }

    async fn write_symbols(&self, repo_id: &str, symbols: &[SymbolInput]) -> anyhow::Result<BatchWriteResult> {
        let attempt = self.symbol_write_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < 2 {
            return Ok(BatchWriteResult {
                count_written: 0,
                errors: vec![IndexError::database("connection refused by peer", true)],
            });
        }
        self.inner.write_symbols(repo_id, symbols).await
    }

    async fn write_ast_nodes(&self, repo_id: &str, nodes: &[repo_kb_indexer::model::AstNodeInput]) -> anyhow::Result<BatchWriteResult> {
        self.inner.write_ast_nodes(repo_id, nodes).await
    }

    async fn write_edges(&self, repo_id: &str, edges: &[EdgeInput]) -> anyhow::Result<BatchWriteResult> {
        self.inner.write_edges(repo_id, edges).await
    }

    async fn existing_checksums(&self, repo_id: &str) -> anyhow::Result<HashMap<String, String>> {
        self.inner.existing_checksums(repo_id).await
    }

    async fn symbol_exists(&self, symbol_id: &str) -> anyhow::Result<bool> {
        self.inner.symbol_exists(symbol_id).await
    }

    async fn optimize_for_bulk_inserts(&self) -> anyhow::Result<()> {
        self.inner.optimize_for_bulk_inserts().await
    }

    async fn reset_optimizations(&self) -> anyhow::Result<()> {
        self.inner.reset_optimizations().await
    }

    async fn analyze_tables(&self) -> anyhow::Result<()> {
        self.inner.analyze_tables().await
    }

    async fn begin_transaction(&self) -> anyhow::Result<()> {
        self.inner.begin_transaction().await
    }

    async fn commit_transaction(&self) -> anyhow::Result<()> {
        self.inner.commit_transaction().await
    }

    async fn rollback_transaction(&self) -> anyhow::Result<()> {
        self.inner.rollback_transaction().await
    }
}

#[tokio::test]
async fn retryable_database_failure_succeeds_within_retry_budget() {
    let inner = SqliteStore::from_connection(rusqlite::Connection::open_in_memory().unwrap());
    inner.init().await.unwrap();
    let flaky = FlakyRelationalStore { inner, symbol_write_attempts: AtomicU64::new(0) };
    let relational: Arc<dyn RelationalStore> = Arc::new(flaky);
    let graph: Arc<dyn GraphStore> = Arc::new(PetGraphStore::new());
    let indexer = Indexer::new(Config::builder().skip_vectors(true).build(), relational, graph, None).unwrap();

    let output = parse_output(
        vec![FileInput {
            file_id: "F1".into(),
            path: "main.go".into(),
            language: "go".into(),
            size: 42,
            checksum: "c1".into(),
            symbols: vec![symbol("S1", "F1", "main", SymbolKind::Function, "func main()")],
            nodes: vec![],
        }],
        vec![],
    );

    let result = indexer.index(output).await;
    assert_eq!(result.status, IndexStatus::Success, "{:?}", result.errors);
    assert_eq!(result.symbols_created, 1);
}

/// S2 — a file missing `file_id` fails validation before any write happens.
#[tokio::test]
async fn missing_file_id_fails_validation_with_no_writes() {
    let relational = sqlite_store().await;
    let graph: Arc<dyn GraphStore> = Arc::new(PetGraphStore::new());
    let indexer = Indexer::new(Config::builder().skip_vectors(true).build(), relational, graph, None).unwrap();

    let output = parse_output(
        vec![FileInput {
            file_id: String::new(),
            path: "main.go".into(),
            language: "go".into(),
            size: 42,
            checksum: "c1".into(),
            symbols: vec![],
            nodes: vec![],
        }],
        vec![],
    );

    let result = indexer.index(output).await;
    assert_eq!(result.status, IndexStatus::Failed);
    assert_eq!(result.files_processed, 0);
    assert_eq!(result.errors[0].kind, repo_kb_indexer::error::ErrorKind::Validation);
}
