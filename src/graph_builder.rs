//! Graph builder (§4.6): materializes symbols as labeled vertices and edges
//! as typed relationships in the property-graph store. Non-fatal: every
//! per-item failure is collected rather than aborting the run.

use crate::error::{ErrorKind, IndexError};
use crate::model::{EdgeInput, SymbolInput};
use crate::store::{GraphEdge, GraphStore, GraphVertex};
use anyhow::Result;
use std::sync::Arc;

pub struct GraphBuilder {
    store: Arc<dyn GraphStore>,
    graph_name: String,
}

impl GraphBuilder {
    pub fn new(store: Arc<dyn GraphStore>, graph_name: impl Into<String>) -> Self {
        Self {
            store,
            graph_name: graph_name.into(),
        }
    }

    pub async fn ensure_graph(&self) -> Result<()> {
        self.store.init_graph(&self.graph_name).await
    }

    pub async fn write_vertices(&self, symbols: &[SymbolInput], files_by_id: &std::collections::HashMap<String, String>) -> Vec<IndexError> {
        let mut errors = Vec::new();
        for symbol in symbols {
            let file_path = files_by_id.get(&symbol.file_id).cloned().unwrap_or_default();
            let vertex = GraphVertex {
                symbol_id: symbol.symbol_id.clone(),
                label: symbol.kind.vertex_label().to_string(),
                name: symbol.name.clone(),
                signature: symbol.signature.clone(),
                file_path,
                span_start_line: symbol.span.start_line,
                span_end_line: symbol.span.end_line,
            };
            if let Err(err) = self.store.upsert_vertex(&self.graph_name, vertex).await {
                errors.push(
                    IndexError::new(ErrorKind::Graph, err.to_string())
                        .with_retryable(true)
                        .with_entity_id(symbol.symbol_id.clone()),
                );
            }
        }
        errors
    }

    /// Skips edges with an empty `target_id` — external-module imports are
    /// resolved to a synthetic symbol upstream in the associator/orchestrator
    /// before reaching this stage; anything still unresolved here is left
    /// for the relational store only (§4.6).
    pub async fn write_edges(&self, edges: &[EdgeInput]) -> Vec<IndexError> {
        let mut errors = Vec::new();
        for edge in edges {
            let target_id = match edge.target_id.as_deref() {
                Some(id) if !id.is_empty() => id,
                _ => continue,
            };

            let graph_edge = GraphEdge {
                edge_id: edge.edge_id.clone(),
                source_id: edge.source_id.clone(),
                target_id: target_id.to_string(),
                relationship_type: edge.edge_type.relationship_type().to_string(),
                source_file: edge.source_file.clone(),
                target_file: edge.target_file.clone(),
            };

            if let Err(err) = self.store.upsert_edge(&self.graph_name, graph_edge).await {
                errors.push(
                    IndexError::new(ErrorKind::Graph, err.to_string())
                        .with_retryable(true)
                        .with_entity_id(edge.edge_id.clone()),
                );
            }
        }
        errors
    }
}
