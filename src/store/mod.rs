//! Store-facing trait boundaries (§6.2): relational, property-graph, and
//! vector persistence. Each concrete store lives in its own module.

pub mod graph;
pub mod sqlite;
pub mod vector;

use crate::error::IndexError;
use crate::model::{AstNodeInput, EdgeInput, FileInput, SymbolInput};
use anyhow::Result;
use async_trait::async_trait;

/// Outcome of a non-transactional batch write: how many rows landed and
/// which ones failed (batch continues past per-row/per-batch errors).
#[derive(Debug, Clone, Default)]
pub struct BatchWriteResult {
    pub count_written: u64,
    pub errors: Vec<IndexError>,
}

impl BatchWriteResult {
    pub fn merge(&mut self, other: BatchWriteResult) {
        self.count_written += other.count_written;
        self.errors.extend(other.errors);
    }
}

/// Relational persistence for files, symbols, AST nodes, and edges (§6.2).
/// Implementations enforce the foreign keys named in the spec and expose
/// bulk-insert optimization hooks the writer calls around the write phase.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn ensure_repository(&self, repo_id: &str, repo_name: Option<&str>, repo_url: Option<&str>, branch: Option<&str>) -> Result<()>;

    async fn write_files(&self, repo_id: &str, files: &[FileInput]) -> Result<BatchWriteResult>;
    async fn write_symbols(&self, repo_id: &str, symbols: &[SymbolInput]) -> Result<BatchWriteResult>;
    async fn write_ast_nodes(&self, repo_id: &str, nodes: &[AstNodeInput]) -> Result<BatchWriteResult>;
    async fn write_edges(&self, repo_id: &str, edges: &[EdgeInput]) -> Result<BatchWriteResult>;

    /// Checksums keyed by `file_id` for incremental filtering (§8 invariant 3).
    async fn existing_checksums(&self, repo_id: &str) -> Result<std::collections::HashMap<String, String>>;

    async fn symbol_exists(&self, symbol_id: &str) -> Result<bool>;

    async fn optimize_for_bulk_inserts(&self) -> Result<()>;
    async fn reset_optimizations(&self) -> Result<()>;
    async fn analyze_tables(&self) -> Result<()>;

    /// Opens a store-level transaction spanning subsequent write calls until
    /// `commit_transaction`/`rollback_transaction` is called.
    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct GraphVertex {
    pub symbol_id: String,
    pub label: String,
    pub name: String,
    pub signature: String,
    pub file_path: String,
    pub span_start_line: u32,
    pub span_end_line: u32,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub source_file: Option<String>,
    pub target_file: Option<String>,
}

/// Property-graph persistence (§6.2, §4.6). Vertices and edges are upserted
/// by a caller-supplied primary key so re-indexing is idempotent.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn init_graph(&self, name: &str) -> Result<()>;
    async fn upsert_vertex(&self, graph_name: &str, vertex: GraphVertex) -> Result<()>;
    async fn upsert_edge(&self, graph_name: &str, edge: GraphEdge) -> Result<()>;
    async fn vertex_count(&self, graph_name: &str) -> Result<usize>;
    async fn edge_count(&self, graph_name: &str) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub vector_id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub model: String,
    pub chunk_index: u32,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub record: VectorRecord,
    pub distance: f32,
}

/// Vector persistence (§6.2, §4.9). `entity_id`/`entity_type` identify what
/// was embedded; `vector_id` is the record's own primary key.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn dim(&self) -> usize;
    async fn add_records(&self, records: Vec<VectorRecord>) -> Result<()>;
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>>;
    async fn delete_by_entity(&self, entity_id: &str, entity_type: &str) -> Result<()>;
}
