//! Structural and referential-integrity validation of a single parse output
//! (§4.2). Stateless across calls; a `Validate` call builds its id sets
//! fresh each time.

use crate::model::ParseOutput;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    RequiredField,
    InvalidType,
    InvalidValue,
    ReferentialIntegrity,
    DuplicateId,
    InvalidSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub file_path: Option<String>,
    pub field: Option<String>,
    pub value: Option<String>,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            file_path: None,
            field: None,
            value: None,
        }
    }

    fn entity(mut self, entity_type: &str, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.into());
        self
    }

    fn file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    fn field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, input: &ParseOutput) -> ValidationResult {
        let mut errors = Vec::new();

        let mut file_ids: HashSet<&str> = HashSet::new();
        let mut symbol_ids: HashSet<&str> = HashSet::new();
        let mut node_ids: HashSet<&str> = HashSet::new();
        let mut node_parents: Vec<(&str, &str)> = Vec::new();

        for file in &input.files {
            if file.file_id.is_empty() {
                errors.push(
                    ValidationError::new(ValidationErrorKind::RequiredField, "file.file_id is required")
                        .file(file.path.clone()),
                );
                continue;
            }
            if file.path.is_empty() {
                errors.push(
                    ValidationError::new(ValidationErrorKind::RequiredField, "file.path is required")
                        .entity("file", file.file_id.clone()),
                );
            }
            if file.language.is_empty() {
                errors.push(
                    ValidationError::new(ValidationErrorKind::RequiredField, "file.language is required")
                        .entity("file", file.file_id.clone()),
                );
            }
            if file.checksum.is_empty() {
                errors.push(
                    ValidationError::new(ValidationErrorKind::RequiredField, "file.checksum is required")
                        .entity("file", file.file_id.clone()),
                );
            }

            if !file_ids.insert(file.file_id.as_str()) {
                errors.push(
                    ValidationError::new(
                        ValidationErrorKind::DuplicateId,
                        format!("duplicate file_id: {}", file.file_id),
                    )
                    .entity("file", file.file_id.clone()),
                );
            }

            for symbol in &file.symbols {
                if symbol.file_id != file.file_id {
                    errors.push(
                        ValidationError::new(
                            ValidationErrorKind::ReferentialIntegrity,
                            "symbol.file_id does not match enclosing file",
                        )
                        .entity("symbol", symbol.symbol_id.clone())
                        .field("file_id"),
                    );
                }
                if !symbol_ids.insert(symbol.symbol_id.as_str()) {
                    errors.push(
                        ValidationError::new(
                            ValidationErrorKind::DuplicateId,
                            format!("duplicate symbol_id: {}", symbol.symbol_id),
                        )
                        .entity("symbol", symbol.symbol_id.clone()),
                    );
                }
                if !symbol.span.is_well_ordered() {
                    errors.push(
                        ValidationError::new(ValidationErrorKind::InvalidSpan, "symbol span is not well-ordered")
                            .entity("symbol", symbol.symbol_id.clone()),
                    );
                }
            }

            for node in &file.nodes {
                if node.file_id != file.file_id {
                    errors.push(
                        ValidationError::new(
                            ValidationErrorKind::ReferentialIntegrity,
                            "node.file_id does not match enclosing file",
                        )
                        .entity("ast_node", node.node_id.clone())
                        .field("file_id"),
                    );
                }
                if !node_ids.insert(node.node_id.as_str()) {
                    errors.push(
                        ValidationError::new(
                            ValidationErrorKind::DuplicateId,
                            format!("duplicate node_id: {}", node.node_id),
                        )
                        .entity("ast_node", node.node_id.clone()),
                    );
                }
                if !node.span.is_well_ordered() {
                    errors.push(
                        ValidationError::new(ValidationErrorKind::InvalidSpan, "ast node span is not well-ordered")
                            .entity("ast_node", node.node_id.clone()),
                    );
                }
                if let Some(parent_id) = &node.parent_id {
                    if !parent_id.is_empty() {
                        node_parents.push((node.node_id.as_str(), parent_id.as_str()));
                    }
                }
            }
        }

        for (node_id, parent_id) in node_parents {
            if !node_ids.contains(parent_id) {
                errors.push(
                    ValidationError::new(
                        ValidationErrorKind::ReferentialIntegrity,
                        format!("ast node parent_id {parent_id} does not resolve"),
                    )
                    .entity("ast_node", node_id)
                    .field("parent_id")
                    .value_of(parent_id),
                );
            }
        }

        for edge in &input.relationships {
            if !symbol_ids.contains(edge.source_id.as_str()) {
                errors.push(
                    ValidationError::new(
                        ValidationErrorKind::ReferentialIntegrity,
                        format!("edge source_id {} does not resolve", edge.source_id),
                    )
                    .entity("edge", edge.edge_id.clone())
                    .field("source_id"),
                );
            }

            match &edge.target_id {
                Some(target_id) if !target_id.is_empty() => {
                    if !symbol_ids.contains(target_id.as_str()) {
                        errors.push(
                            ValidationError::new(
                                ValidationErrorKind::ReferentialIntegrity,
                                format!("edge target_id {target_id} does not resolve"),
                            )
                            .entity("edge", edge.edge_id.clone())
                            .field("target_id"),
                        );
                    }
                }
                _ => {
                    if edge.edge_type.requires_target_id() {
                        errors.push(
                            ValidationError::new(
                                ValidationErrorKind::InvalidValue,
                                format!("{} edges require a target_id", edge.edge_type.as_str()),
                            )
                            .entity("edge", edge.edge_id.clone()),
                        );
                    } else if edge.target_module.as_deref().unwrap_or("").is_empty() {
                        errors.push(
                            ValidationError::new(
                                ValidationErrorKind::InvalidValue,
                                "import edges require target_id or target_module",
                            )
                            .entity("edge", edge.edge_id.clone()),
                        );
                    }
                }
            }
        }

        let meta = &input.metadata;
        if meta.success_count + meta.failure_count != meta.total_files {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidValue,
                format!(
                    "metadata success_count ({}) + failure_count ({}) != total_files ({})",
                    meta.success_count, meta.failure_count, meta.total_files
                ),
            ));
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

trait ValidationErrorValueExt {
    fn value_of(self, value: &str) -> Self;
}

impl ValidationErrorValueExt for ValidationError {
    fn value_of(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AstNodeInput, EdgeInput, EdgeType, FileInput, ParseMetadata, Span, SymbolInput, SymbolKind};

    fn minimal_output() -> ParseOutput {
        ParseOutput {
            metadata: ParseMetadata {
                total_files: 1,
                success_count: 1,
                failure_count: 0,
                ..Default::default()
            },
            files: vec![FileInput {
                file_id: "F1".into(),
                path: "main.go".into(),
                language: "go".into(),
                size: 42,
                checksum: "c1".into(),
                symbols: vec![SymbolInput {
                    symbol_id: "S1".into(),
                    file_id: "F1".into(),
                    name: "main".into(),
                    kind: SymbolKind::Function,
                    signature: "func main()".into(),
                    span: Span { start_line: 1, end_line: 5, start_byte: 0, end_byte: 50 },
                    docstring: None,
                    semantic_summary: None,
                }],
                nodes: vec![],
            }],
            relationships: vec![],
            repo_id: None,
            repo_name: None,
            repo_url: None,
            branch: None,
            commit_hash: None,
        }
    }

    #[test]
    fn happy_path_is_valid() {
        let result = Validator::new().validate(&minimal_output());
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn missing_file_id_is_required_field_error() {
        let mut output = minimal_output();
        output.files[0].file_id = String::new();
        let result = Validator::new().validate(&output);
        assert!(!result.valid);
        assert_eq!(result.errors[0].kind, ValidationErrorKind::RequiredField);
    }

    #[test]
    fn duplicate_symbol_id_is_flagged() {
        let mut output = minimal_output();
        let dup = output.files[0].symbols[0].clone();
        output.files[0].symbols.push(dup);
        let result = Validator::new().validate(&output);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.kind == ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn dangling_ast_parent_is_referential_integrity_error() {
        let mut output = minimal_output();
        output.files[0].nodes.push(AstNodeInput {
            node_id: "N1".into(),
            file_id: "F1".into(),
            node_type: "block".into(),
            parent_id: Some("does-not-exist".into()),
            span: Span { start_line: 1, end_line: 1, start_byte: 0, end_byte: 1 },
            text: String::new(),
            attributes: Default::default(),
        });
        let result = Validator::new().validate(&output);
        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::ReferentialIntegrity && e.field.as_deref() == Some("parent_id")));
    }

    #[test]
    fn call_edge_without_target_id_is_invalid() {
        let mut output = minimal_output();
        output.relationships.push(EdgeInput {
            edge_id: "E1".into(),
            source_id: "S1".into(),
            target_id: None,
            edge_type: EdgeType::Call,
            source_file: None,
            target_file: None,
            target_module: None,
        });
        let result = Validator::new().validate(&output);
        assert!(!result.valid);
    }

    #[test]
    fn import_edge_with_target_module_only_is_valid() {
        let mut output = minimal_output();
        output.relationships.push(EdgeInput {
            edge_id: "E1".into(),
            source_id: "S1".into(),
            target_id: None,
            edge_type: EdgeType::Import,
            source_file: None,
            target_file: None,
            target_module: Some("fmt".into()),
        });
        let result = Validator::new().validate(&output);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn metadata_count_mismatch_is_flagged() {
        let mut output = minimal_output();
        output.metadata.failure_count = 5;
        let result = Validator::new().validate(&output);
        assert!(!result.valid);
    }
}
