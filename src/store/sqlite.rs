//! Relational persistence over `rusqlite` (§6.2), grounded on the teacher's
//! `storage/sqlite/operations.rs` bootstrap/migration pattern, generalized
//! from the teacher's fixed symbol/edge tables to the repo/file/symbol/
//! ast_node/edge shape this pipeline needs.

use crate::error::{ErrorKind, IndexError};
use crate::model::{AstNodeInput, EdgeInput, FileInput, SymbolInput};
use crate::store::{BatchWriteResult, RelationalStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS repositories (
  id TEXT PRIMARY KEY NOT NULL,
  name TEXT,
  url TEXT,
  branch TEXT,
  created_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE TABLE IF NOT EXISTS files (
  id TEXT PRIMARY KEY NOT NULL,
  repo_id TEXT NOT NULL,
  path TEXT NOT NULL,
  language TEXT NOT NULL,
  size INTEGER NOT NULL,
  checksum TEXT NOT NULL,
  created_at INTEGER NOT NULL DEFAULT (unixepoch()),
  updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
  FOREIGN KEY(repo_id) REFERENCES repositories(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_repo ON files(repo_id);
CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);

CREATE TABLE IF NOT EXISTS symbols (
  id TEXT PRIMARY KEY NOT NULL,
  file_id TEXT NOT NULL,
  name TEXT NOT NULL,
  kind TEXT NOT NULL,
  signature TEXT NOT NULL,
  start_line INTEGER NOT NULL,
  end_line INTEGER NOT NULL,
  start_byte INTEGER NOT NULL,
  end_byte INTEGER NOT NULL,
  docstring TEXT,
  semantic_summary TEXT,
  created_at INTEGER NOT NULL DEFAULT (unixepoch()),
  FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

CREATE TABLE IF NOT EXISTS ast_nodes (
  id TEXT PRIMARY KEY NOT NULL,
  file_id TEXT NOT NULL,
  node_type TEXT NOT NULL,
  parent_id TEXT,
  start_line INTEGER NOT NULL,
  end_line INTEGER NOT NULL,
  start_byte INTEGER NOT NULL,
  end_byte INTEGER NOT NULL,
  text TEXT NOT NULL,
  FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE,
  FOREIGN KEY(parent_id) REFERENCES ast_nodes(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_ast_nodes_file ON ast_nodes(file_id);
CREATE INDEX IF NOT EXISTS idx_ast_nodes_parent ON ast_nodes(parent_id);

CREATE TABLE IF NOT EXISTS edges (
  id TEXT PRIMARY KEY NOT NULL,
  source_id TEXT NOT NULL,
  target_id TEXT,
  edge_type TEXT NOT NULL,
  source_file TEXT,
  target_file TEXT,
  target_module TEXT,
  created_at INTEGER NOT NULL DEFAULT (unixepoch()),
  FOREIGN KEY(source_id) REFERENCES symbols(id) ON DELETE CASCADE,
  FOREIGN KEY(target_id) REFERENCES symbols(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create db parent dir: {}", parent.display()))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open sqlite db: {}", db_path.display()))?;
        let store = Self { conn: Mutex::new(conn) };
        Ok(store)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub async fn init(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(SCHEMA_SQL).context("failed to initialize sqlite schema")?;
        Ok(())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn ensure_repository(
        &self,
        repo_id: &str,
        repo_name: Option<&str>,
        repo_url: Option<&str>,
        branch: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO repositories (id, name, url, branch) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, url = excluded.url, branch = excluded.branch",
            params![repo_id, repo_name, repo_url, branch],
        )
        .context("failed to upsert repository")?;
        Ok(())
    }

    async fn write_files(&self, repo_id: &str, files: &[FileInput]) -> Result<BatchWriteResult> {
        let conn = self.conn.lock().await;
        let mut result = BatchWriteResult::default();
        for file in files {
            let outcome = conn.execute(
                "INSERT INTO files (id, repo_id, path, language, size, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET path = excluded.path, language = excluded.language,
                     size = excluded.size, checksum = excluded.checksum, updated_at = unixepoch()",
                params![file.file_id, repo_id, file.path, file.language, file.size as i64, file.checksum],
            );
            match outcome {
                Ok(_) => result.count_written += 1,
                Err(err) => result.errors.push(
                    IndexError::database(err.to_string(), !is_constraint_violation(&err))
                        .with_entity_id(file.file_id.clone())
                        .with_file_path(file.path.clone()),
                ),
            }
        }
        Ok(result)
    }

    async fn write_symbols(&self, _repo_id: &str, symbols: &[SymbolInput]) -> Result<BatchWriteResult> {
        let conn = self.conn.lock().await;
        let mut result = BatchWriteResult::default();
        for symbol in symbols {
            let outcome = conn.execute(
                "INSERT INTO symbols (id, file_id, name, kind, signature, start_line, end_line, start_byte, end_byte, docstring, semantic_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, kind = excluded.kind, signature = excluded.signature,
                     start_line = excluded.start_line, end_line = excluded.end_line,
                     start_byte = excluded.start_byte, end_byte = excluded.end_byte,
                     docstring = excluded.docstring, semantic_summary = excluded.semantic_summary",
                params![
                    symbol.symbol_id,
                    symbol.file_id,
                    symbol.name,
                    symbol.kind.as_str_key(),
                    symbol.signature,
                    symbol.span.start_line,
                    symbol.span.end_line,
                    symbol.span.start_byte,
                    symbol.span.end_byte,
                    symbol.docstring,
                    symbol.semantic_summary,
                ],
            );
            match outcome {
                Ok(_) => result.count_written += 1,
                Err(err) => result.errors.push(
                    IndexError::database(err.to_string(), !is_constraint_violation(&err))
                        .with_entity_id(symbol.symbol_id.clone()),
                ),
            }
        }
        Ok(result)
    }

    async fn write_ast_nodes(&self, _repo_id: &str, nodes: &[AstNodeInput]) -> Result<BatchWriteResult> {
        let conn = self.conn.lock().await;
        let mut result = BatchWriteResult::default();
        for node in nodes {
            let outcome = conn.execute(
                "INSERT INTO ast_nodes (id, file_id, node_type, parent_id, start_line, end_line, start_byte, end_byte, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET node_type = excluded.node_type, parent_id = excluded.parent_id,
                     start_line = excluded.start_line, end_line = excluded.end_line,
                     start_byte = excluded.start_byte, end_byte = excluded.end_byte, text = excluded.text",
                params![
                    node.node_id,
                    node.file_id,
                    node.node_type,
                    node.parent_id,
                    node.span.start_line,
                    node.span.end_line,
                    node.span.start_byte,
                    node.span.end_byte,
                    node.text,
                ],
            );
            match outcome {
                Ok(_) => result.count_written += 1,
                Err(err) => result.errors.push(
                    IndexError::database(err.to_string(), !is_constraint_violation(&err))
                        .with_entity_id(node.node_id.clone()),
                ),
            }
        }
        Ok(result)
    }

    async fn write_edges(&self, _repo_id: &str, edges: &[EdgeInput]) -> Result<BatchWriteResult> {
        let conn = self.conn.lock().await;
        let mut result = BatchWriteResult::default();
        for edge in edges {
            let outcome = conn.execute(
                "INSERT INTO edges (id, source_id, target_id, edge_type, source_file, target_file, target_module)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET source_id = excluded.source_id, target_id = excluded.target_id,
                     edge_type = excluded.edge_type, source_file = excluded.source_file,
                     target_file = excluded.target_file, target_module = excluded.target_module",
                params![
                    edge.edge_id,
                    edge.source_id,
                    edge.target_id,
                    edge.edge_type.as_str(),
                    edge.source_file,
                    edge.target_file,
                    edge.target_module,
                ],
            );
            match outcome {
                Ok(_) => result.count_written += 1,
                Err(err) => {
                    let kind = if matches!(err, rusqlite::Error::SqliteFailure(ref e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation) {
                        ErrorKind::NotFound
                    } else {
                        ErrorKind::Database
                    };
                    result.errors.push(
                        IndexError::new(kind, err.to_string()).with_entity_id(edge.edge_id.clone()),
                    );
                }
            }
        }
        Ok(result)
    }

    async fn existing_checksums(&self, repo_id: &str) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, checksum FROM files WHERE repo_id = ?1")?;
        let rows = stmt.query_map(params![repo_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (file_id, checksum) = row?;
            map.insert(file_id, checksum);
        }
        Ok(map)
    }

    async fn symbol_exists(&self, symbol_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM symbols WHERE id = ?1",
            params![symbol_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn optimize_for_bulk_inserts(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("PRAGMA synchronous = OFF; PRAGMA journal_mode = MEMORY;")
            .context("failed to apply bulk-insert pragmas")?;
        Ok(())
    }

    async fn reset_optimizations(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("PRAGMA synchronous = FULL; PRAGMA journal_mode = DELETE;")
            .context("failed to reset pragmas")?;
        Ok(())
    }

    async fn analyze_tables(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("ANALYZE;").context("failed to analyze tables")?;
        Ok(())
    }

    /// Opens a connection-level transaction. Issued as raw SQL rather than a
    /// held `rusqlite::Transaction` value so the `Mutex<Connection>` guard can
    /// be released between calls; SQLite keeps the transaction open on the
    /// connection itself until the matching `COMMIT`/`ROLLBACK`.
    async fn begin_transaction(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("BEGIN IMMEDIATE").context("failed to begin transaction")?;
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("COMMIT").context("failed to commit transaction")?;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("ROLLBACK").context("failed to rollback transaction")?;
        Ok(())
    }
}
