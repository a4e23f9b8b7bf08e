//! Header/implementation associator (§4.7). Only relevant to C/C++/
//! Objective-C(++) sources: pairs headers with same-directory,
//! same-basename implementation files, synthesizes virtual file-as-symbol
//! vertices for both, and emits declaration/definition edges between
//! matching symbol pairs.

use crate::ids::virtual_file_symbol_id;
use crate::model::{EdgeInput, EdgeType, FileInput, SymbolInput, SymbolKind};
use std::collections::HashMap;
use std::path::Path;

const HEADER_EXTENSIONS: &[&str] = &["h", "hpp", "hh", "hxx"];
const IMPL_EXTENSIONS: &[&str] = &["c", "cpp", "cc", "cxx", "m", "mm"];
const HEADER_IMPL_LANGUAGES: &[&str] = &["c", "cpp", "c++", "objective-c", "objective-c++", "objc", "objcpp"];

pub struct AssociationResult {
    pub virtual_symbols: Vec<SymbolInput>,
    pub edges: Vec<EdgeInput>,
}

pub struct Associator;

impl Associator {
    pub fn new() -> Self {
        Self
    }

    pub fn associate(&self, files: &[FileInput]) -> AssociationResult {
        let mut virtual_symbols = Vec::new();
        let mut edges = Vec::new();
        let mut edge_seq: u64 = 0;

        let relevant: Vec<&FileInput> = files
            .iter()
            .filter(|f| HEADER_IMPL_LANGUAGES.contains(&f.language.to_ascii_lowercase().as_str()))
            .collect();

        let headers: Vec<&FileInput> = relevant.iter().filter(|f| is_header(&f.path)).copied().collect();
        let impls: Vec<&FileInput> = relevant.iter().filter(|f| is_impl(&f.path)).copied().collect();

        for header in &headers {
            let Some(paired_impl) = find_pair(header, &impls) else {
                continue;
            };

            let header_symbol_id = virtual_file_symbol_id(&header.path);
            let impl_symbol_id = virtual_file_symbol_id(&paired_impl.path);

            push_virtual_symbol(&mut virtual_symbols, header, &header_symbol_id);
            push_virtual_symbol(&mut virtual_symbols, paired_impl, &impl_symbol_id);

            edge_seq += 1;
            edges.push(EdgeInput {
                edge_id: format!("implements_header:{edge_seq}"),
                source_id: impl_symbol_id,
                target_id: Some(header_symbol_id),
                edge_type: EdgeType::ImplementsHeader,
                source_file: Some(paired_impl.path.clone()),
                target_file: Some(header.path.clone()),
                target_module: None,
            });

            for header_symbol in &header.symbols {
                for impl_symbol in &paired_impl.symbols {
                    if !declaration_matches_definition(header_symbol, impl_symbol) {
                        continue;
                    }
                    edge_seq += 1;
                    edges.push(EdgeInput {
                        edge_id: format!("implements_declaration:{edge_seq}"),
                        source_id: impl_symbol.symbol_id.clone(),
                        target_id: Some(header_symbol.symbol_id.clone()),
                        edge_type: EdgeType::ImplementsDeclaration,
                        source_file: Some(paired_impl.path.clone()),
                        target_file: Some(header.path.clone()),
                        target_module: None,
                    });
                }
            }
        }

        AssociationResult { virtual_symbols, edges }
    }
}

impl Default for Associator {
    fn default() -> Self {
        Self::new()
    }
}

fn push_virtual_symbol(out: &mut Vec<SymbolInput>, file: &FileInput, symbol_id: &str) {
    out.push(SymbolInput {
        symbol_id: symbol_id.to_string(),
        file_id: file.file_id.clone(),
        name: file.path.clone(),
        kind: SymbolKind::Module,
        signature: format!("file: {}", file.path),
        span: crate::model::Span::default(),
        docstring: None,
        semantic_summary: None,
    });
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn is_header(path: &str) -> bool {
    HEADER_EXTENSIONS.contains(&extension(path).as_str())
}

fn is_impl(path: &str) -> bool {
    IMPL_EXTENSIONS.contains(&extension(path).as_str())
}

fn basename_without_extension(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

fn directory_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .and_then(|p| p.to_str())
        .unwrap_or("")
        .to_string()
}

/// First implementation file in the same directory sharing the header's
/// basename, preferring `IMPL_EXTENSIONS` in declared order.
fn find_pair<'a>(header: &FileInput, impls: &[&'a FileInput]) -> Option<&'a FileInput> {
    let header_dir = directory_of(&header.path);
    let header_base = basename_without_extension(&header.path);

    IMPL_EXTENSIONS.iter().find_map(|&ext| {
        impls
            .iter()
            .copied()
            .find(|f| extension(&f.path) == ext && directory_of(&f.path) == header_dir && basename_without_extension(&f.path) == header_base)
    })
}

fn normalize_signature(signature: &str) -> String {
    let collapsed = signature.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" (", "(")
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" ,", ",")
        .replace(", ", ",")
}

fn normalized_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn kinds_are_compatible(header_kind: SymbolKind, impl_kind: SymbolKind) -> bool {
    matches!(
        (header_kind, impl_kind),
        (SymbolKind::Interface, SymbolKind::Function)
            | (SymbolKind::Function, SymbolKind::Function)
            | (SymbolKind::Class, SymbolKind::Class)
            | (SymbolKind::Interface, SymbolKind::Class)
    )
}

fn declaration_matches_definition(header_symbol: &SymbolInput, impl_symbol: &SymbolInput) -> bool {
    normalized_name(&header_symbol.name) == normalized_name(&impl_symbol.name)
        && kinds_are_compatible(header_symbol.kind, impl_symbol.kind)
        && normalize_signature(&header_symbol.signature) == normalize_signature(&impl_symbol.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Span;

    fn file(path: &str, language: &str, symbols: Vec<SymbolInput>) -> FileInput {
        FileInput {
            file_id: path.to_string(),
            path: path.to_string(),
            language: language.to_string(),
            size: 10,
            checksum: "c".into(),
            symbols,
            nodes: vec![],
        }
    }

    fn symbol(id: &str, name: &str, kind: SymbolKind, signature: &str) -> SymbolInput {
        SymbolInput {
            symbol_id: id.into(),
            file_id: String::new(),
            name: name.into(),
            kind,
            signature: signature.into(),
            span: Span { start_line: 1, end_line: 1, start_byte: 0, end_byte: 1 },
            docstring: None,
            semantic_summary: None,
        }
    }

    #[test]
    fn pairs_header_and_impl_same_basename() {
        let header = file(
            "src/test.h",
            "c",
            vec![symbol("H1", "myFunction", SymbolKind::Interface, "int myFunction ( int x )")],
        );
        let implementation = file(
            "src/test.c",
            "c",
            vec![symbol("I1", "myFunction", SymbolKind::Function, "int myFunction(int x)")],
        );

        let result = Associator::new().associate(&[header, implementation]);

        assert_eq!(result.virtual_symbols.len(), 2);
        assert_eq!(result.edges.iter().filter(|e| e.edge_type == EdgeType::ImplementsHeader).count(), 1);
        assert_eq!(
            result.edges.iter().filter(|e| e.edge_type == EdgeType::ImplementsDeclaration).count(),
            1
        );
    }

    #[test]
    fn mismatched_basename_is_not_paired() {
        let header = file("src/a.h", "c", vec![]);
        let implementation = file("src/b.c", "c", vec![]);
        let result = Associator::new().associate(&[header, implementation]);
        assert!(result.edges.is_empty());
        assert!(result.virtual_symbols.is_empty());
    }

    #[test]
    fn non_c_family_language_is_ignored() {
        let header = file("src/test.h", "rust", vec![]);
        let implementation = file("src/test.c", "rust", vec![]);
        let result = Associator::new().associate(&[header, implementation]);
        assert!(result.edges.is_empty());
    }

    #[test]
    fn signature_normalization_tolerates_whitespace_differences() {
        assert_eq!(normalize_signature("int   foo ( int   x , int y )"), normalize_signature("int foo(int x,int y)"));
    }
}
