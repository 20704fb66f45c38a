//! Persistent columnar vector table.
//!
//! One LanceDB dataset per store (`vectors/` for code, `docs-vectors/`
//! for docs), keyed by chunk id. The vector dimension is fixed at
//! creation and validated on open and on every insert; wrong-length
//! vectors fail loudly rather than being padded or truncated.

use std::{path::Path, sync::Arc};

use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use futures::TryStreamExt;
use lancedb::{
  Connection, DistanceType,
  query::{ExecutableQuery, QueryBase},
  connect,
};
use tracing::{debug, trace};
use uuid::Uuid;

use super::schema::{CHUNKS_TABLE, chunks_schema, schema_dimension};
use crate::domain::{Chunk, ChunkKind};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Vector dimension mismatch: expected {expected}, got {got}")]
  DimensionMismatch { expected: usize, got: usize },
  #[error("Store corrupt: {0}")]
  Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Escape a value for use inside a single-quoted filter literal.
pub(crate) fn quote(value: &str) -> String {
  value.replace('\'', "''")
}

// ============================================================================
// VectorStore
// ============================================================================

pub struct VectorStore {
  table: lancedb::Table,
  dimension: usize,
}

impl VectorStore {
  /// Create or attach the store at `dir`. The dimension is fixed at
  /// creation time; attaching with a different dimension is an error.
  pub async fn open(dir: &Path, dimension: usize) -> Result<Self> {
    tokio::fs::create_dir_all(dir).await?;
    let connection: Connection = connect(dir.to_string_lossy().as_ref()).execute().await?;

    let names = connection.table_names().execute().await?;
    let table = if names.contains(&CHUNKS_TABLE.to_string()) {
      let table = connection.open_table(CHUNKS_TABLE).execute().await?;
      let stored = schema_dimension(&table.schema().await?)
        .ok_or_else(|| StoreError::Corrupt("chunk table has no vector column".into()))?;
      if stored != dimension {
        return Err(StoreError::DimensionMismatch {
          expected: dimension,
          got: stored,
        });
      }
      table
    } else {
      debug!(path = %dir.display(), dimension, "Creating chunk table");
      connection
        .create_empty_table(CHUNKS_TABLE, chunks_schema(dimension))
        .execute()
        .await?
    };

    Ok(Self { table, dimension })
  }

  pub fn dimension(&self) -> usize {
    self.dimension
  }

  /// Atomically replace chunks by id: any row with a matching id is
  /// removed before the batch is inserted.
  pub async fn upsert_chunks(&self, chunks: &[(Chunk, Vec<f32>)]) -> Result<()> {
    if chunks.is_empty() {
      return Ok(());
    }

    for (chunk, vector) in chunks {
      if vector.len() != self.dimension {
        trace!(id = %chunk.id, got = vector.len(), "Rejecting wrong-length vector");
        return Err(StoreError::DimensionMismatch {
          expected: self.dimension,
          got: vector.len(),
        });
      }
    }

    let ids: Vec<String> = chunks.iter().map(|(c, _)| format!("'{}'", quote(&c.id.to_string()))).collect();
    self.table.delete(&format!("id IN ({})", ids.join(", "))).await?;

    let batch = chunks_to_batch(chunks, self.dimension)?;
    let iter = RecordBatchIterator::new(vec![Ok(batch)], chunks_schema(self.dimension));
    self.table.add(Box::new(iter)).execute().await?;
    Ok(())
  }

  /// Remove all chunks for a project-relative path.
  pub async fn delete_by_path(&self, path: &str) -> Result<()> {
    debug!(table = CHUNKS_TABLE, path = %path, "Deleting chunks by path");
    self.table.delete(&format!("path = '{}'", quote(path))).await?;
    Ok(())
  }

  /// Top-k nearest chunks by cosine similarity. Scores are normalized to
  /// `[0, 1]`; ties break by ascending id.
  pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>> {
    if query.len() != self.dimension {
      return Err(StoreError::DimensionMismatch {
        expected: self.dimension,
        got: query.len(),
      });
    }

    let batches: Vec<RecordBatch> = self
      .table
      .vector_search(query.to_vec())?
      .distance_type(DistanceType::Cosine)
      .limit(k)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut hits = Vec::new();
    for batch in batches {
      let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .cloned();
      for row in 0..batch.num_rows() {
        let chunk = batch_to_chunk(&batch, row)?;
        let distance = distances.as_ref().map(|a| a.value(row)).unwrap_or(0.0);
        let similarity = (1.0 - distance).clamp(0.0, 1.0);
        hits.push((chunk, similarity));
      }
    }

    hits.sort_by(|a, b| {
      b.1
        .partial_cmp(&a.1)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.0.id.cmp(&b.0.id))
    });
    hits.truncate(k);
    Ok(hits)
  }

  /// Fetch chunks by id, in no particular order.
  pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let list: Vec<String> = ids.iter().map(|id| format!("'{}'", quote(id))).collect();
    self.query_chunks(Some(&format!("id IN ({})", list.join(", ")))).await
  }

  /// All chunks for a path, ordered by start line.
  pub async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>> {
    let mut chunks = self.query_chunks(Some(&format!("path = '{}'", quote(path)))).await?;
    chunks.sort_by_key(|c| c.start_line);
    Ok(chunks)
  }

  pub async fn count(&self) -> Result<usize> {
    Ok(self.table.count_rows(None).await?)
  }

  async fn query_chunks(&self, filter: Option<&str>) -> Result<Vec<Chunk>> {
    let query = match filter {
      Some(f) => self.table.query().only_if(f),
      None => self.table.query(),
    };
    let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

    let mut chunks = Vec::new();
    for batch in batches {
      for row in 0..batch.num_rows() {
        chunks.push(batch_to_chunk(&batch, row)?);
      }
    }
    Ok(chunks)
  }
}

// ============================================================================
// Arrow Conversion
// ============================================================================

fn chunks_to_batch(chunks: &[(Chunk, Vec<f32>)], dimension: usize) -> Result<RecordBatch> {
  let ids: Vec<String> = chunks.iter().map(|(c, _)| c.id.to_string()).collect();
  let paths: Vec<&str> = chunks.iter().map(|(c, _)| c.path.as_str()).collect();
  let start_lines: Vec<u32> = chunks.iter().map(|(c, _)| c.start_line).collect();
  let end_lines: Vec<u32> = chunks.iter().map(|(c, _)| c.end_line).collect();
  let texts: Vec<&str> = chunks.iter().map(|(c, _)| c.text.as_str()).collect();
  let fingerprints: Vec<&str> = chunks.iter().map(|(c, _)| c.fingerprint.as_str()).collect();
  let kinds: Vec<&str> = chunks.iter().map(|(c, _)| c.kind.as_str()).collect();

  let mut values: Vec<f32> = Vec::with_capacity(chunks.len() * dimension);
  for (_, vector) in chunks {
    values.extend_from_slice(vector);
  }
  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  let vectors = FixedSizeListArray::try_new(field, dimension as i32, Arc::new(Float32Array::from(values)), None)?;

  Ok(RecordBatch::try_new(
    chunks_schema(dimension),
    vec![
      Arc::new(StringArray::from(ids)),
      Arc::new(StringArray::from(paths)),
      Arc::new(UInt32Array::from(start_lines)),
      Arc::new(UInt32Array::from(end_lines)),
      Arc::new(StringArray::from(texts)),
      Arc::new(StringArray::from(fingerprints)),
      Arc::new(StringArray::from(kinds)),
      Arc::new(vectors),
    ],
  )?)
}

fn batch_to_chunk(batch: &RecordBatch, row: usize) -> Result<Chunk> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| StoreError::Corrupt(format!("missing column {name}")))
  };

  let get_u32 = |name: &str| -> Result<u32> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| StoreError::Corrupt(format!("missing column {name}")))
  };

  let id = Uuid::parse_str(&get_string("id")?).map_err(|_| StoreError::Corrupt("invalid chunk id".into()))?;
  let kind_str = get_string("kind")?;
  let kind = ChunkKind::parse(&kind_str).ok_or_else(|| StoreError::Corrupt(format!("invalid kind {kind_str}")))?;

  Ok(Chunk {
    id,
    path: get_string("path")?,
    start_line: get_u32("start_line")?,
    end_line: get_u32("end_line")?,
    text: get_string("text")?,
    fingerprint: get_string("fingerprint")?,
    kind,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chunk(path: &str, start: u32, end: u32, text: &str) -> Chunk {
    Chunk::new(path, start, end, text.to_string(), "fp01", ChunkKind::Code)
  }

  fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
  }

  #[tokio::test]
  async fn test_open_create_and_reattach() {
    let dir = tempfile::TempDir::new().unwrap();
    {
      let store = VectorStore::open(dir.path(), 8).await.unwrap();
      assert_eq!(store.count().await.unwrap(), 0);
    }
    // Re-attach with the same dimension works; a different one fails.
    assert!(VectorStore::open(dir.path(), 8).await.is_ok());
    let err = VectorStore::open(dir.path(), 16).await.unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { expected: 16, got: 8 }));
  }

  #[tokio::test]
  async fn test_wrong_length_vector_fails_loudly() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = VectorStore::open(dir.path(), 8).await.unwrap();

    let err = store
      .upsert_chunks(&[(chunk("a.rs", 1, 1, "x"), vec![0.0; 4])])
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { expected: 8, got: 4 }));
    assert_eq!(store.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_upsert_replaces_by_id() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = VectorStore::open(dir.path(), 8).await.unwrap();

    let mut c = chunk("a.rs", 1, 2, "original");
    store.upsert_chunks(&[(c.clone(), unit(8, 0))]).await.unwrap();

    c.text = "replaced".to_string();
    store.upsert_chunks(&[(c.clone(), unit(8, 0))]).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let fetched = store.get_by_ids(&[c.id.to_string()]).await.unwrap();
    assert_eq!(fetched[0].text, "replaced");
  }

  #[tokio::test]
  async fn test_delete_by_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = VectorStore::open(dir.path(), 8).await.unwrap();

    store
      .upsert_chunks(&[
        (chunk("a.rs", 1, 2, "one"), unit(8, 0)),
        (chunk("a.rs", 3, 4, "two"), unit(8, 1)),
        (chunk("b.rs", 1, 2, "three"), unit(8, 2)),
      ])
      .await
      .unwrap();

    store.delete_by_path("a.rs").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.chunks_for_path("a.rs").await.unwrap().is_empty());
    assert_eq!(store.chunks_for_path("b.rs").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_search_ranks_by_cosine() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = VectorStore::open(dir.path(), 4).await.unwrap();

    store
      .upsert_chunks(&[
        (chunk("close.rs", 1, 1, "close"), vec![1.0, 0.0, 0.0, 0.0]),
        (chunk("near.rs", 1, 1, "near"), {
          let mut v = vec![0.8, 0.6, 0.0, 0.0];
          crate::embedding::l2_normalize(&mut v);
          v
        }),
        (chunk("far.rs", 1, 1, "far"), vec![0.0, 0.0, 0.0, 1.0]),
      ])
      .await
      .unwrap();

    let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.path, "close.rs");
    assert_eq!(hits[1].0.path, "near.rs");
    for (_, score) in &hits {
      assert!((0.0..=1.0).contains(score));
    }
    assert!(hits[0].1 > hits[1].1);
  }

  #[tokio::test]
  async fn test_search_rejects_wrong_query_dim() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = VectorStore::open(dir.path(), 4).await.unwrap();
    assert!(store.search(&[1.0, 0.0], 5).await.is_err());
  }
}
