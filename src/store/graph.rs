//! Property-graph persistence over `petgraph` (§6.2, §4.6), grounded on the
//! `NodeIndex` + `Mutex<HashMap<..>>` lookup pattern used by the pack's
//! `drift-analysis` reachability cache, since the teacher has no true
//! graph-database client of its own.

use crate::store::{GraphEdge, GraphStore, GraphVertex};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use petgraph::graph::{Graph, NodeIndex};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct VertexData {
    pub symbol_id: String,
    pub label: String,
    pub name: String,
    pub signature: String,
    pub file_path: String,
    pub span_start_line: u32,
    pub span_end_line: u32,
}

#[derive(Debug, Clone)]
pub struct EdgeData {
    pub edge_id: String,
    pub relationship_type: String,
    pub source_file: Option<String>,
    pub target_file: Option<String>,
}

struct NamedGraph {
    graph: Graph<VertexData, EdgeData>,
    vertices: HashMap<String, NodeIndex>,
    edges: HashMap<String, (NodeIndex, NodeIndex)>,
}

impl NamedGraph {
    fn new() -> Self {
        Self {
            graph: Graph::new(),
            vertices: HashMap::new(),
            edges: HashMap::new(),
        }
    }
}

/// In-process property-graph keyed by graph name. A "graph" in this store
/// is a logical partition, not a separate connection the way a true graph
/// database server would model it.
pub struct PetGraphStore {
    graphs: Mutex<HashMap<String, NamedGraph>>,
}

impl PetGraphStore {
    pub fn new() -> Self {
        Self {
            graphs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for PetGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for PetGraphStore {
    async fn init_graph(&self, name: &str) -> Result<()> {
        let mut graphs = self.graphs.lock().expect("graph store mutex poisoned");
        graphs.entry(name.to_string()).or_insert_with(NamedGraph::new);
        Ok(())
    }

    async fn upsert_vertex(&self, graph_name: &str, vertex: GraphVertex) -> Result<()> {
        let mut graphs = self.graphs.lock().expect("graph store mutex poisoned");
        let named = graphs
            .entry(graph_name.to_string())
            .or_insert_with(NamedGraph::new);

        let data = VertexData {
            symbol_id: vertex.symbol_id.clone(),
            label: vertex.label,
            name: vertex.name,
            signature: vertex.signature,
            file_path: vertex.file_path,
            span_start_line: vertex.span_start_line,
            span_end_line: vertex.span_end_line,
        };

        match named.vertices.get(&vertex.symbol_id) {
            Some(&index) => {
                named.graph[index] = data;
            }
            None => {
                let index = named.graph.add_node(data);
                named.vertices.insert(vertex.symbol_id, index);
            }
        }
        Ok(())
    }

    async fn upsert_edge(&self, graph_name: &str, edge: GraphEdge) -> Result<()> {
        let mut graphs = self.graphs.lock().expect("graph store mutex poisoned");
        let named = graphs
            .entry(graph_name.to_string())
            .or_insert_with(NamedGraph::new);

        let source = *named
            .vertices
            .get(&edge.source_id)
            .ok_or_else(|| anyhow!("source vertex {} not present in graph {}", edge.source_id, graph_name))?;
        let target = *named
            .vertices
            .get(&edge.target_id)
            .ok_or_else(|| anyhow!("target vertex {} not present in graph {}", edge.target_id, graph_name))?;

        let data = EdgeData {
            edge_id: edge.edge_id.clone(),
            relationship_type: edge.relationship_type,
            source_file: edge.source_file,
            target_file: edge.target_file,
        };

        if let Some(&(existing_source, existing_target)) = named.edges.get(&edge.edge_id) {
            if let Some(existing_edge) = named.graph.find_edge(existing_source, existing_target) {
                named.graph.remove_edge(existing_edge);
            }
        }

        named.graph.add_edge(source, target, data);
        named.edges.insert(edge.edge_id, (source, target));
        Ok(())
    }

    async fn vertex_count(&self, graph_name: &str) -> Result<usize> {
        let graphs = self.graphs.lock().expect("graph store mutex poisoned");
        Ok(graphs.get(graph_name).map(|g| g.graph.node_count()).unwrap_or(0))
    }

    async fn edge_count(&self, graph_name: &str) -> Result<usize> {
        let graphs = self.graphs.lock().expect("graph store mutex poisoned");
        Ok(graphs.get(graph_name).map(|g| g.graph.edge_count()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(id: &str, label: &str) -> GraphVertex {
        GraphVertex {
            symbol_id: id.to_string(),
            label: label.to_string(),
            name: id.to_string(),
            signature: String::new(),
            file_path: "main.go".into(),
            span_start_line: 1,
            span_end_line: 5,
        }
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let store = PetGraphStore::new();
        store.init_graph("code_graph").await.unwrap();
        store.init_graph("code_graph").await.unwrap();
        assert_eq!(store.vertex_count("code_graph").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_vertex_is_idempotent_by_symbol_id() {
        let store = PetGraphStore::new();
        store.upsert_vertex("g", vertex("S1", "Function")).await.unwrap();
        store.upsert_vertex("g", vertex("S1", "Function")).await.unwrap();
        assert_eq!(store.vertex_count("g").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_edge_requires_known_vertices() {
        let store = PetGraphStore::new();
        store.upsert_vertex("g", vertex("S1", "Function")).await.unwrap();
        store.upsert_vertex("g", vertex("S2", "Function")).await.unwrap();
        let edge = GraphEdge {
            edge_id: "E1".into(),
            source_id: "S1".into(),
            target_id: "S2".into(),
            relationship_type: "CALLS".into(),
            source_file: None,
            target_file: None,
        };
        store.upsert_edge("g", edge).await.unwrap();
        assert_eq!(store.edge_count("g").await.unwrap(), 1);

        let dangling = GraphEdge {
            edge_id: "E2".into(),
            source_id: "S1".into(),
            target_id: "does-not-exist".into(),
            relationship_type: "CALLS".into(),
            source_file: None,
            target_file: None,
        };
        assert!(store.upsert_edge("g", dangling).await.is_err());
    }

    #[tokio::test]
    async fn upsert_edge_twice_does_not_duplicate() {
        let store = PetGraphStore::new();
        store.upsert_vertex("g", vertex("S1", "Function")).await.unwrap();
        store.upsert_vertex("g", vertex("S2", "Function")).await.unwrap();
        let edge = || GraphEdge {
            edge_id: "E1".into(),
            source_id: "S1".into(),
            target_id: "S2".into(),
            relationship_type: "CALLS".into(),
            source_file: None,
            target_file: None,
        };
        store.upsert_edge("g", edge()).await.unwrap();
        store.upsert_edge("g", edge()).await.unwrap();
        assert_eq!(store.edge_count("g").await.unwrap(), 1);
    }
}
