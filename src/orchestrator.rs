//! Orchestrator (§4.1): drives validation, persistence, header/implementation
//! association, graph construction, and embedding generation for one parse
//! output, synthesizing a final `IndexResult` status from whatever errors
//! were collected along the way.

use crate::associator::Associator;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::embedder::{Embedder, EmbedderConfig};
use crate::error::{ErrorCollector, ErrorKind, IndexError};
use crate::graph_builder::GraphBuilder;
use crate::ids;
use crate::model::{FileInput, IndexResult, IndexStatus, ParseOutput, SymbolInput, SymbolKind};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{GraphStore, RelationalStore, VectorStore};
use crate::writer::{RelationalWriter, RetryPolicy};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

pub struct Indexer {
    relational: Arc<dyn RelationalStore>,
    writer: RelationalWriter,
    graph_builder: GraphBuilder,
    associator: Associator,
    embedder: Option<Arc<Embedder>>,
    config: Config,
}

impl Indexer {
    pub fn new(
        config: Config,
        relational: Arc<dyn RelationalStore>,
        graph: Arc<dyn GraphStore>,
        vector: Option<Arc<dyn VectorStore>>,
    ) -> Result<Self> {
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: config.base_retry_delay,
            max_delay: config.max_retry_delay,
        };
        let writer = RelationalWriter::new(relational.clone(), config.batch_size, retry);
        let graph_builder = GraphBuilder::new(graph, config.graph_name.clone());

        let embedder = if config.skip_vectors {
            None
        } else if let Some(vector_store) = vector {
            let embedder_config = EmbedderConfig {
                endpoint: config.embedding_endpoint.clone(),
                model: config.embedding_model.clone(),
                api_key: config.embedding_api_key.clone(),
                dimensions: config.embedding_dimensions,
                batch_size: config.batch_size,
                max_retries: config.max_retries,
                base_retry_delay: config.base_retry_delay,
                max_retry_delay: config.max_retry_delay,
                request_timeout: config.timeout,
                max_requests_per_second: config.max_requests_per_second,
                worker_count: config.worker_count,
            };
            Some(Arc::new(Embedder::new(embedder_config, vector_store)?))
        } else {
            None
        };

        Ok(Self {
            relational,
            writer,
            graph_builder,
            associator: Associator::new(),
            embedder,
            config,
        })
    }

    pub async fn index(&self, parse_output: ParseOutput) -> IndexResult {
        self.index_with_progress(parse_output, None, &CancellationToken::new()).await
    }

    pub async fn index_with_progress(
        &self,
        parse_output: ParseOutput,
        sink: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> IndexResult {
        let started = Instant::now();
        let emit = |stage: &str, pct: f32, message: &str| {
            if let Some(sink) = &sink {
                sink.emit(ProgressEvent::new(stage, pct, message));
            }
        };

        emit("validate", 0.0, "validating parse output");
        let validation = crate::validator::Validator::new().validate(&parse_output);
        if !validation.valid {
            let errors: Vec<IndexError> = validation
                .errors
                .into_iter()
                .map(|e| {
                    let mut err = IndexError::new(ErrorKind::Validation, e.message);
                    if let Some(entity_id) = e.entity_id {
                        err = err.with_entity_id(entity_id);
                    }
                    if let Some(file_path) = e.file_path {
                        err = err.with_file_path(file_path);
                    }
                    err
                })
                .collect();
            emit("validate", 12.5, "validation failed");
            return failed_result(None, errors, started);
        }
        emit("validate", 12.5, "validation passed");

        let repo_id = parse_output
            .repo_id
            .clone()
            .unwrap_or_else(|| ids::generate_repo_id(parse_output.repo_name.as_deref()));

        emit("repository", 12.5, "upserting repository");
        if let Err(err) = self
            .relational
            .ensure_repository(
                &repo_id,
                parse_output.repo_name.as_deref(),
                parse_output.repo_url.as_deref(),
                parse_output.branch.as_deref(),
            )
            .await
        {
            tracing::error!(repo_id = %repo_id, error = %err, "repository upsert failed");
            return failed_result(
                Some(repo_id),
                vec![IndexError::database(err.to_string(), false)],
                started,
            );
        }
        emit("repository", 25.0, "repository upserted");

        let collector = ErrorCollector::new();

        emit("external_file", 25.0, "ensuring external-file sentinel");
        let sentinel = FileInput {
            file_id: ids::EXTERNAL_FILE_ID.to_string(),
            path: ids::EXTERNAL_FILE_PATH.to_string(),
            language: ids::EXTERNAL_FILE_LANGUAGE.to_string(),
            size: 0,
            checksum: "external".to_string(),
            symbols: vec![],
            nodes: vec![],
        };
        match self.relational.write_files(&repo_id, std::slice::from_ref(&sentinel)).await {
            Ok(result) => collector.extend(result.errors),
            Err(err) => tracing::warn!(error = %err, "external-file sentinel write failed"),
        }
        emit("external_file", 37.5, "external-file sentinel ready");

        emit("incremental_filter", 37.5, "applying incremental filter");
        let retained_files = if self.config.incremental {
            match self.relational.existing_checksums(&repo_id).await {
                Ok(existing) => parse_output
                    .files
                    .into_iter()
                    .filter(|file| existing.get(&file.file_id) != Some(&file.checksum))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    tracing::warn!(error = %err, "incremental checksum lookup failed, indexing all files");
                    parse_output.files
                }
            }
        } else {
            parse_output.files
        };
        let files_processed = retained_files.len() as u64;
        emit(
            "incremental_filter",
            50.0,
            &format!("{files_processed} files retained"),
        );

        let mut files_by_id: HashMap<String, String> = retained_files
            .iter()
            .map(|f| (f.file_id.clone(), f.path.clone()))
            .collect();
        files_by_id.insert(ids::EXTERNAL_FILE_ID.to_string(), ids::EXTERNAL_FILE_PATH.to_string());

        let mut symbols: Vec<SymbolInput> = retained_files.iter().flat_map(|f| f.symbols.clone()).collect();
        let nodes: Vec<_> = retained_files.iter().flat_map(|f| f.nodes.clone()).collect();

        let retained_symbol_ids: HashSet<&str> = symbols.iter().map(|s| s.symbol_id.as_str()).collect();
        let mut edges: Vec<_> = parse_output
            .relationships
            .into_iter()
            .filter(|e| retained_symbol_ids.contains(e.source_id.as_str()))
            .collect();

        let mut seen_external_modules: HashSet<String> = HashSet::new();
        for edge in &mut edges {
            if edge.edge_type.requires_target_id() || edge.target_id.is_some() {
                continue;
            }
            let Some(module) = edge.target_module.clone().filter(|m| !m.is_empty()) else {
                continue;
            };
            let synthetic_id = ids::external_symbol_id(&module);
            edge.target_id = Some(synthetic_id.clone());
            if seen_external_modules.insert(module.clone()) {
                symbols.push(SymbolInput {
                    symbol_id: synthetic_id,
                    file_id: ids::EXTERNAL_FILE_ID.to_string(),
                    name: module.clone(),
                    kind: SymbolKind::Module,
                    signature: format!("external module: {module}"),
                    span: crate::model::Span::default(),
                    docstring: None,
                    semantic_summary: None,
                });
            }
        }

        emit("write_data", 50.0, "writing relational data");
        let mut nodes_created = 0u64;
        let mut edges_created = 0u64;
        let mut symbols_created = 0u64;
        let write_result = self
            .write_data(&repo_id, &retained_files, &symbols, &nodes, &edges, cancel)
            .await;
        match write_result {
            Ok(outcome) => {
                symbols_created += outcome.symbols_created;
                nodes_created += outcome.nodes_created;
                edges_created += outcome.edges_created;
                collector.extend(outcome.errors);
            }
            Err(err) => {
                tracing::error!(repo_id = %repo_id, error = %err, "transactional write failed");
                return failed_result(Some(repo_id), vec![IndexError::database(err.to_string(), false)], started);
            }
        }
        emit("write_data", 62.5, "relational data written");

        emit("associate", 62.5, "associating headers and implementations");
        let association = self.associator.associate(&retained_files);
        if !association.virtual_symbols.is_empty() {
            let result = self.writer.write_symbols(&repo_id, &association.virtual_symbols, cancel, true).await;
            match result {
                Ok(result) => {
                    symbols_created += result.count_written;
                    collector.extend(result.errors);
                }
                Err(err) => collector.push(IndexError::database(err.to_string(), true)),
            }
        }
        if !association.edges.is_empty() {
            let result = self.writer.write_edges(&repo_id, &association.edges, cancel, true).await;
            match result {
                Ok(result) => {
                    edges_created += result.count_written;
                    collector.extend(result.errors);
                }
                Err(err) => collector.push(IndexError::database(err.to_string(), true)),
            }
        }
        emit("associate", 75.0, "association complete");

        let all_symbols: Vec<SymbolInput> = symbols.into_iter().chain(association.virtual_symbols.into_iter()).collect();
        let all_edges: Vec<_> = edges.into_iter().chain(association.edges.into_iter()).collect();

        emit("graph", 75.0, "building property graph");
        if let Err(err) = self.graph_builder.ensure_graph().await {
            tracing::warn!(error = %err, "graph initialization failed");
            collector.push(IndexError::new(ErrorKind::Graph, err.to_string()).with_retryable(true));
        } else {
            collector.extend(self.graph_builder.write_vertices(&all_symbols, &files_by_id).await);
            collector.extend(self.graph_builder.write_edges(&all_edges).await);
        }
        emit("graph", 87.5, "graph build complete");

        let mut vectors_created = 0u64;
        emit("embed", 87.5, "generating embeddings");
        if let Some(embedder) = &self.embedder {
            let result = embedder.embed_symbols_parallel(all_symbols, cancel).await;
            vectors_created = result.vectors_created;
            collector.extend(result.errors);
        }
        emit("embed", 100.0, "embedding complete");

        let errors = collector.into_vec();
        let status = synthesize_status(&errors);
        let summary = summarize(&errors);

        if let Some(sink) = &sink {
            sink.emit(ProgressEvent::new("done", 100.0, "index complete").with_error_flag(status == IndexStatus::Failed));
        }

        IndexResult {
            repo_id,
            status,
            files_processed,
            symbols_created,
            nodes_created,
            edges_created,
            vectors_created,
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
            summary,
        }
    }

    async fn write_data(
        &self,
        repo_id: &str,
        files: &[FileInput],
        symbols: &[SymbolInput],
        nodes: &[crate::model::AstNodeInput],
        edges: &[crate::model::EdgeInput],
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        if !self.config.use_transactions {
            return self.write_data_untransactional(repo_id, files, symbols, nodes, edges, cancel, true).await;
        }

        self.relational.optimize_for_bulk_inserts().await?;
        self.relational.begin_transaction().await?;

        // §4.5: no retries inside a transaction — a retried batch would need
        // to re-observe rows written earlier in the same open transaction.
        let result = self.write_data_untransactional(repo_id, files, symbols, nodes, edges, cancel, false).await;

        match result {
            Ok(outcome) if outcome.errors.is_empty() => {
                self.relational.commit_transaction().await?;
                self.relational.analyze_tables().await?;
                Ok(outcome)
            }
            Ok(outcome) => {
                self.relational.rollback_transaction().await?;
                anyhow::bail!(
                    "transactional write rolled back on batch error: {}",
                    outcome.errors[0].message
                );
            }
            Err(err) => {
                self.relational.rollback_transaction().await?;
                Err(err)
            }
        }
    }

    async fn write_data_untransactional(
        &self,
        repo_id: &str,
        files: &[FileInput],
        symbols: &[SymbolInput],
        nodes: &[crate::model::AstNodeInput],
        edges: &[crate::model::EdgeInput],
        cancel: &CancellationToken,
        retry: bool,
    ) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();

        let files_result = self.writer.write_files(repo_id, files, cancel, retry).await?;
        outcome.errors.extend(files_result.errors);

        let symbols_result = self.writer.write_symbols(repo_id, symbols, cancel, retry).await?;
        outcome.symbols_created = symbols_result.count_written;
        outcome.errors.extend(symbols_result.errors);

        let nodes_result = self.writer.write_ast_nodes(repo_id, nodes, cancel, retry).await?;
        outcome.nodes_created = nodes_result.count_written;
        outcome.errors.extend(nodes_result.errors);

        let edges_result = self.writer.write_edges(repo_id, edges, cancel, retry).await?;
        outcome.edges_created = edges_result.count_written;
        outcome.errors.extend(edges_result.errors);

        Ok(outcome)
    }
}

#[derive(Default)]
struct WriteOutcome {
    symbols_created: u64,
    nodes_created: u64,
    edges_created: u64,
    errors: Vec<IndexError>,
}

fn synthesize_status(errors: &[IndexError]) -> IndexStatus {
    if errors.iter().any(|e| !e.retryable) {
        IndexStatus::PartialSuccess
    } else if !errors.is_empty() {
        IndexStatus::SuccessWithWarnings
    } else {
        IndexStatus::Success
    }
}

fn summarize(errors: &[IndexError]) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    for err in errors {
        *out.entry(err.kind.to_string()).or_insert(0u64) += 1;
    }
    out
}

fn failed_result(repo_id: Option<String>, errors: Vec<IndexError>, started: Instant) -> IndexResult {
    let summary = summarize(&errors);
    IndexResult {
        repo_id: repo_id.unwrap_or_default(),
        status: IndexStatus::Failed,
        files_processed: 0,
        symbols_created: 0,
        nodes_created: 0,
        edges_created: 0,
        vectors_created: 0,
        duration_ms: started.elapsed().as_millis() as u64,
        errors,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParseMetadata, Span, SymbolKind};
    use crate::store::graph::PetGraphStore;
    use crate::store::sqlite::SqliteStore;
    use crate::store::vector::LanceVectorStore;

    async fn indexer(config: Config) -> Indexer {
        let sqlite = SqliteStore::from_connection(rusqlite::Connection::open_in_memory().unwrap());
        sqlite.init().await.unwrap();
        let relational: Arc<dyn RelationalStore> = Arc::new(sqlite);
        let graph: Arc<dyn GraphStore> = Arc::new(PetGraphStore::new());
        Indexer::new(config, relational, graph, None).unwrap()
    }

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
                size: 10,
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
            repo_id: Some("R1".into()),
            repo_name: None,
            repo_url: None,
            branch: None,
            commit_hash: None,
        }
    }

    #[tokio::test]
    async fn happy_path_reports_success() {
        let indexer = indexer(Config::builder().skip_vectors(true).build()).await;
        let result = indexer.index(minimal_output()).await;
        assert_eq!(result.status, IndexStatus::Success, "{:?}", result.errors);
        assert_eq!(result.files_processed, 1);
        assert_eq!(result.symbols_created, 1);
    }

    #[tokio::test]
    async fn invalid_input_yields_failed_status_with_no_writes() {
        let indexer = indexer(Config::builder().skip_vectors(true).build()).await;
        let mut output = minimal_output();
        output.files[0].file_id = String::new();
        let result = indexer.index(output).await;
        assert_eq!(result.status, IndexStatus::Failed);
        assert_eq!(result.files_processed, 0);
    }

    #[tokio::test]
    async fn external_import_resolves_to_synthetic_symbol() {
        let indexer = indexer(Config::builder().skip_vectors(true).build()).await;
        let mut output = minimal_output();
        output.relationships.push(crate::model::EdgeInput {
            edge_id: "E1".into(),
            source_id: "S1".into(),
            target_id: None,
            edge_type: crate::model::EdgeType::Import,
            source_file: None,
            target_file: None,
            target_module: Some("fmt".into()),
        });
        let result = indexer.index(output).await;
        assert_eq!(result.status, IndexStatus::Success, "{:?}", result.errors);
        assert_eq!(result.edges_created, 1);
        assert_eq!(result.symbols_created, 2);
    }

    #[tokio::test]
    async fn incremental_rerun_with_unchanged_checksum_skips_file() {
        let indexer = indexer(Config::builder().skip_vectors(true).incremental(true).build()).await;
        let first = indexer.index(minimal_output()).await;
        assert_eq!(first.status, IndexStatus::Success, "{:?}", first.errors);

        let second = indexer.index(minimal_output()).await;
        assert_eq!(second.status, IndexStatus::Success, "{:?}", second.errors);
        assert_eq!(second.files_processed, 0);
    }

    #[allow(dead_code)]
    async fn with_vector_store() -> Arc<dyn VectorStore> {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("repo-kb-indexer-orch-{nanos}"));
        Arc::new(LanceVectorStore::connect(&dir, "vectors", 3).await.unwrap())
    }
}
