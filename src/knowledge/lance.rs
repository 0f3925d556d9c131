//! LanceDB Index Storage - 인덱스 영속화
//!
//! 청크와 임베딩을 LanceDB 테이블 하나에 기록하고 다시 읽어옵니다.
//! 검색은 메모리에서 수행하므로 여기서는 전체 스캔만 사용합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::document::Chunk;
use super::vector::{IndexStorage, VectorEntry};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceIndexStorage
// ============================================================================

/// LanceDB 기반 인덱스 저장소
///
/// 행마다 `position`(삽입 순서)을 함께 저장해 로드 시 순서를 복원합니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct LanceIndexStorage;

impl LanceIndexStorage {
    pub fn new() -> Self {
        Self
    }

    async fn connect(dir: &Path) -> Result<Connection> {
        let path_str = dir
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")
    }

    /// 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("position", DataType::Int64, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("sequence", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;
        let dimension = first.embedding.len();

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch in {}#{}: expected {}, got {}",
                bad.chunk.document_id,
                bad.chunk.sequence,
                dimension,
                bad.embedding.len()
            );
        }

        let positions: Vec<i64> = (0..entries.len() as i64).collect();
        let document_ids: Vec<&str> = entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        let sequences: Vec<i64> = entries.iter().map(|e| e.chunk.sequence as i64).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;
        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(Int64Array::from(positions)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(Int64Array::from(sequences)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// RecordBatch에서 (position, 엔트리) 추출
    fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<(i64, VectorEntry)>> {
        let positions = batch
            .column_by_name("position")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing position column"))?;

        let document_ids = batch
            .column_by_name("document_id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing document_id column"))?;

        let sequences = batch
            .column_by_name("sequence")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing sequence column"))?;

        let texts = batch
            .column_by_name("text")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;

        let embeddings = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?;

        let mut rows = Vec::with_capacity(batch.num_rows());

        for i in 0..batch.num_rows() {
            let values = embeddings.value(i);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| anyhow::anyhow!("Embedding values are not Float32"))?;

            rows.push((
                positions.value(i),
                VectorEntry {
                    chunk: Chunk {
                        document_id: document_ids.value(i).to_string(),
                        sequence: usize::try_from(sequences.value(i))
                            .context("Negative chunk sequence")?,
                        text: texts.value(i).to_string(),
                    },
                    embedding: values.values().to_vec(),
                },
            ));
        }

        Ok(rows)
    }
}

#[async_trait]
impl IndexStorage for LanceIndexStorage {
    async fn save(&self, dir: &Path, entries: &[VectorEntry]) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .context("Failed to create LanceDB directory")?;

        if entries.is_empty() {
            tracing::warn!("No vectors to persist; writing empty index");
            return Ok(());
        }

        let db = Self::connect(dir).await?;
        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        db.create_table(TABLE_NAME, batches)
            .execute()
            .await
            .context("Failed to create table")?;

        tracing::debug!("Persisted {} vectors to {:?}", entries.len(), dir);
        Ok(())
    }

    async fn load(&self, dir: &Path) -> Result<Vec<VectorEntry>> {
        if !dir.exists() {
            anyhow::bail!("LanceDB directory not found: {:?}", dir);
        }

        let db = Self::connect(dir).await?;
        let names = db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;

        if !names.iter().any(|n| n == TABLE_NAME) {
            return Ok(vec![]);
        }

        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")?;

        let count = table.count_rows(None).await.context("Failed to count rows")?;

        let stream = table
            .query()
            .limit(count.max(1))
            .execute()
            .await
            .context("Failed to scan table")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut rows = Vec::with_capacity(count);
        for batch in &batches {
            rows.extend(Self::batch_to_entries(batch)?);
        }

        // 스캔 순서는 보장되지 않으므로 position으로 복원
        rows.sort_by_key(|(position, _)| *position);

        if rows.len() != count {
            anyhow::bail!("Read {} rows, table reports {}", rows.len(), count);
        }

        Ok(rows.into_iter().map(|(_, entry)| entry).collect())
    }

    fn name(&self) -> &'static str {
        "lancedb"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_entry(doc: &str, sequence: usize, seed: f32) -> VectorEntry {
        VectorEntry {
            chunk: Chunk {
                document_id: doc.to_string(),
                sequence,
                text: format!("Test chunk {} for {}", sequence, doc),
            },
            embedding: vec![seed, 1.0 - seed, 0.5, 0.25],
        }
    }

    #[tokio::test]
    async fn test_lance_roundtrip_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("vectors");
        let storage = LanceIndexStorage::new();

        let entries = vec![
            create_test_entry("b.pdf", 0, 0.9),
            create_test_entry("a.pdf", 0, 0.1),
            create_test_entry("a.pdf", 1, 0.5),
        ];
        storage.save(&dir, &entries).await.unwrap();

        let loaded = storage.load(&dir).await.unwrap();
        assert_eq!(loaded, entries);
    }

    #[tokio::test]
    async fn test_lance_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("empty");
        let storage = LanceIndexStorage::new();

        storage.save(&dir, &[]).await.unwrap();
        assert!(storage.load(&dir).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lance_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LanceIndexStorage::new();
        assert!(storage.load(&temp_dir.path().join("nope")).await.is_err());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut bad = create_test_entry("a", 1, 0.2);
        bad.embedding.push(1.0);
        let entries = vec![create_test_entry("a", 0, 0.1), bad];
        assert!(LanceIndexStorage::entries_to_batch(&entries).is_err());
    }
}
