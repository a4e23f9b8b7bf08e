//! Wire shapes for the parse-output ingestion format (§6.1) and the
//! result/status types the orchestrator returns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Variable,
    Module,
    Package,
}

impl SymbolKind {
    pub fn vertex_label(self) -> &'static str {
        match self {
            SymbolKind::Function => "Function",
            SymbolKind::Class => "Class",
            SymbolKind::Interface => "Interface",
            SymbolKind::Variable => "Variable",
            SymbolKind::Module | SymbolKind::Package => "Module",
        }
    }

    pub fn as_str_key(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Module => "module",
            SymbolKind::Package => "package",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Import,
    Call,
    Extends,
    Implements,
    Reference,
    ImplementsDeclaration,
    ImplementsHeader,
}

impl EdgeType {
    pub fn relationship_type(self) -> &'static str {
        match self {
            EdgeType::Call => "CALLS",
            EdgeType::Import => "IMPORTS",
            EdgeType::Extends => "EXTENDS",
            EdgeType::Implements => "IMPLEMENTS",
            EdgeType::Reference => "REFERENCES",
            EdgeType::ImplementsDeclaration => "IMPLEMENTS_DECLARATION",
            EdgeType::ImplementsHeader => "IMPLEMENTS_HEADER",
        }
    }

    pub fn requires_target_id(self) -> bool {
        !matches!(self, EdgeType::Import)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Import => "import",
            EdgeType::Call => "call",
            EdgeType::Extends => "extends",
            EdgeType::Implements => "implements",
            EdgeType::Reference => "reference",
            EdgeType::ImplementsDeclaration => "implements_declaration",
            EdgeType::ImplementsHeader => "implements_header",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
}

impl Span {
    pub fn is_well_ordered(&self) -> bool {
        self.start_line >= 1 && self.end_line >= self.start_line && self.end_byte >= self.start_byte
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInput {
    pub symbol_id: String,
    pub file_id: String,
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub signature: String,
    pub span: Span,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub semantic_summary: Option<String>,
}

impl SymbolInput {
    /// Content composed for embedding: signature, docstring, summary joined
    /// by newline, skipping absent parts.
    pub fn embedding_content(&self) -> String {
        let mut parts = Vec::new();
        if !self.signature.trim().is_empty() {
            parts.push(self.signature.clone());
        }
        if let Some(doc) = &self.docstring {
            if !doc.trim().is_empty() {
                parts.push(doc.clone());
            }
        }
        if let Some(summary) = &self.semantic_summary {
            if !summary.trim().is_empty() {
                parts.push(summary.clone());
            }
        }
        parts.join("\n")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AstNodeInput {
    pub node_id: String,
    pub file_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub span: Span,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInput {
    pub file_id: String,
    pub path: String,
    pub language: String,
    #[serde(default)]
    pub size: u64,
    pub checksum: String,
    #[serde(default)]
    pub symbols: Vec<SymbolInput>,
    #[serde(default)]
    pub nodes: Vec<AstNodeInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeInput {
    pub edge_id: String,
    pub source_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    pub edge_type: EdgeType,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub target_module: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub total_files: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    pub metadata: ParseMetadata,
    pub files: Vec<FileInput>,
    #[serde(default)]
    pub relationships: Vec<EdgeInput>,
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Success,
    SuccessWithWarnings,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResult {
    pub repo_id: String,
    pub status: IndexStatus,
    pub files_processed: u64,
    pub symbols_created: u64,
    pub nodes_created: u64,
    pub edges_created: u64,
    pub vectors_created: u64,
    pub duration_ms: u64,
    pub errors: Vec<crate::error::IndexError>,
    pub summary: HashMap<String, u64>,
}
