//! Vector persistence over `lancedb` (§6.2, §4.9), generalized from the
//! teacher's fixed symbol-only `LanceVectorTable` schema to the spec's
//! generic `{vector_id, entity_id, entity_type, embedding, content, model,
//! chunk_index}` shape.

use crate::store::{VectorHit, VectorRecord, VectorStore};
use anyhow::{anyhow, Context, Result};
use arrow_array::{
    types::Float32Type, types::UInt32Type, Array, FixedSizeListArray, Float32Array, RecordBatch,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;

pub struct LanceVectorStore {
    table: lancedb::Table,
    dim: usize,
}

impl LanceVectorStore {
    pub async fn connect(path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| anyhow!("vector db path is not valid UTF-8"))?;

        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create vector db path: {}", path.display()))?;

        let db: Connection = lancedb::connect(uri)
            .execute()
            .await
            .context("failed to connect to lancedb")?;

        let existing = db
            .table_names()
            .execute()
            .await
            .context("failed to list lancedb table names")?;

        if !existing.iter().any(|n| n == table_name) {
            let schema = Arc::new(build_schema(dim));
            db.create_empty_table(table_name, schema)
                .execute()
                .await
                .context("failed to create lancedb table")?;
        }

        let table = db
            .open_table(table_name)
            .execute()
            .await
            .context("failed to open lancedb table")?;

        Ok(Self { table, dim })
    }
}

fn build_schema(dim: usize) -> Schema {
    Schema::new(vec![
        Field::new("vector_id", DataType::Utf8, true),
        Field::new("entity_id", DataType::Utf8, true),
        Field::new("entity_type", DataType::Utf8, true),
        Field::new(
            "embedding",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            true,
        ),
        Field::new("content", DataType::Utf8, true),
        Field::new("model", DataType::Utf8, true),
        Field::new("chunk_index", DataType::UInt32, true),
    ])
}

fn build_record_batch(schema: Arc<Schema>, records: &[VectorRecord], dim: usize) -> Result<RecordBatch> {
    let vector_ids = StringArray::from(records.iter().map(|r| r.vector_id.as_str()).collect::<Vec<_>>());
    let entity_ids = StringArray::from(records.iter().map(|r| r.entity_id.as_str()).collect::<Vec<_>>());
    let entity_types = StringArray::from(records.iter().map(|r| r.entity_type.as_str()).collect::<Vec<_>>());
    let contents = StringArray::from(records.iter().map(|r| r.content.as_str()).collect::<Vec<_>>());
    let models = StringArray::from(records.iter().map(|r| r.model.as_str()).collect::<Vec<_>>());
    let chunk_indices = UInt32Array::from(records.iter().map(|r| r.chunk_index).collect::<Vec<_>>());

    let embeddings = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        records
            .iter()
            .map(|r| Some(r.embedding.iter().copied().map(Some))),
        dim as i32,
    );

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(vector_ids),
            Arc::new(entity_ids),
            Arc::new(entity_types),
            Arc::new(embeddings),
            Arc::new(contents),
            Arc::new(models),
            Arc::new(chunk_indices),
        ],
    )
    .context("failed to build arrow record batch")
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait::async_trait]
impl VectorStore for LanceVectorStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn add_records(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in &records {
            if record.embedding.len() != self.dim {
                return Err(anyhow!(
                    "vector dim mismatch for {}: expected {}, got {}",
                    record.vector_id,
                    self.dim,
                    record.embedding.len()
                ));
            }
        }

        let schema = Arc::new(build_schema(self.dim));
        let batch = build_record_batch(schema.clone(), &records, self.dim)?;
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema.clone());

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .context("failed to add records to lancedb table")?;
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        if query.len() != self.dim {
            return Err(anyhow!("query vector dim mismatch: expected {}, got {}", self.dim, query.len()));
        }

        let stream = self
            .table
            .query()
            .nearest_to(query)
            .context("failed to build lancedb nearest_to query")?
            .limit(top_k)
            .execute()
            .await
            .context("failed to execute lancedb query")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut out = Vec::new();

        for batch in batches {
            let vector_id = column_str(&batch, "vector_id")?;
            let entity_id = column_str(&batch, "entity_id")?;
            let entity_type = column_str(&batch, "entity_type")?;
            let content = column_str(&batch, "content")?;
            let model = column_str(&batch, "model")?;
            let chunk_index = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<UInt32Array>().cloned());
            let distance = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>().cloned());

            for row in 0..batch.num_rows() {
                if vector_id.is_null(row) {
                    continue;
                }
                out.push(VectorHit {
                    record: VectorRecord {
                        vector_id: vector_id.value(row).to_string(),
                        entity_id: entity_id.value(row).to_string(),
                        entity_type: entity_type.value(row).to_string(),
                        embedding: Vec::new(),
                        content: content.value(row).to_string(),
                        model: model.value(row).to_string(),
                        chunk_index: chunk_index.as_ref().map(|c| c.value(row)).unwrap_or(0),
                    },
                    distance: distance.as_ref().map(|d| d.value(row)).unwrap_or(0.0),
                });
            }
        }

        Ok(out)
    }

    async fn delete_by_entity(&self, entity_id: &str, entity_type: &str) -> Result<()> {
        let predicate = format!(
            "entity_id = '{}' AND entity_type = '{}'",
            escape(entity_id),
            escape(entity_type)
        );
        self.table
            .delete(&predicate)
            .await
            .context("failed to delete lancedb records by entity")?;
        Ok(())
    }
}

fn column_str<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing {name} column in lancedb result"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("{name} column is not a StringArray"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_db_dir() -> std::path::PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("repo-kb-indexer-lancedb-{nanos}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(vector_id: &str, entity_id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            vector_id: vector_id.to_string(),
            entity_id: entity_id.to_string(),
            entity_type: "symbol".to_string(),
            embedding,
            content: "fn main()".to_string(),
            model: "test-model".to_string(),
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn rejects_dimension_mismatch() {
        let dir = tmp_db_dir();
        let store = LanceVectorStore::connect(&dir, "vectors", 3).await.unwrap();
        let bad = record("v1", "S1", vec![1.0, 0.0]);
        assert!(store.add_records(vec![bad]).await.is_err());
    }

    #[tokio::test]
    async fn add_then_search_round_trips() {
        let dir = tmp_db_dir();
        let store = LanceVectorStore::connect(&dir, "vectors", 3).await.unwrap();
        store
            .add_records(vec![
                record("v1", "S1", vec![1.0, 0.0, 0.0]),
                record("v2", "S2", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[0.9, 0.1, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.vector_id, "v1");
    }
}
