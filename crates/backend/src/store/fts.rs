//! Pluggable BM25 full-text index.
//!
//! Both backends persist the `{id, path, text}` catalog as a LanceDB
//! table (`fts/`, `docs-fts/`) so the key space always mirrors the vector
//! store. The native backend additionally builds LanceDB's full-text
//! index and queries it; the always-available in-process backend hydrates
//! a `bm25` index (`k1 = 1.2`, `b = 0.75`, identifier-aware tokenizer)
//! from the catalog at open.

use std::{collections::HashMap, path::Path, sync::Arc};

use arrow_array::{Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use bm25::{Embedder, EmbedderBuilder, Scorer, Tokenizer};
use futures::TryStreamExt;
use lancedb::{
  index::{Index, scalar::FtsIndexBuilder},
  query::{ExecutableQuery, FullTextSearchQuery, QueryBase},
  connect,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
  schema::{FTS_TABLE, fts_schema},
  tokenizer::CodeTokenizer,
  vector::{Result, StoreError, quote},
};
use crate::domain::FtsEngineChoice;

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

/// Corpora at or above this many chunks prefer the native backend under
/// `auto` selection.
pub const NATIVE_THRESHOLD: usize = 10_000;

/// One row of the FTS catalog.
#[derive(Debug, Clone)]
pub struct FtsEntry {
  pub id: String,
  pub path: String,
  pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsBackendKind {
  Native,
  InProcess,
}

/// Resolve the configured engine choice against the corpus size.
pub fn select_backend(choice: FtsEngineChoice, corpus_size: usize) -> FtsBackendKind {
  match choice {
    FtsEngineChoice::Native => FtsBackendKind::Native,
    FtsEngineChoice::Js => FtsBackendKind::InProcess,
    FtsEngineChoice::Auto => {
      if corpus_size >= NATIVE_THRESHOLD {
        FtsBackendKind::Native
      } else {
        FtsBackendKind::InProcess
      }
    }
  }
}

// ============================================================================
// In-Process Index
// ============================================================================

struct MemoryIndex {
  embedder: Embedder<u32, CodeTokenizer>,
  scorer: Scorer<String, u32>,
  texts: HashMap<String, String>,
  /// Document count the current avgdl was computed from.
  avgdl_basis: usize,
}

impl MemoryIndex {
  fn build(entries: &[FtsEntry]) -> Self {
    let tokenizer = CodeTokenizer;
    let total_tokens: usize = entries.iter().map(|e| tokenizer.tokenize(&e.text).len()).sum();
    let avgdl = if entries.is_empty() {
      50.0
    } else {
      (total_tokens as f32 / entries.len() as f32).max(1.0)
    };

    let embedder = EmbedderBuilder::<u32, CodeTokenizer>::with_avgdl(avgdl).k1(BM25_K1).b(BM25_B).build();
    let mut scorer = Scorer::new();
    let mut texts = HashMap::with_capacity(entries.len());
    for entry in entries {
      scorer.upsert(&entry.id, embedder.embed(&entry.text));
      texts.insert(entry.id.clone(), entry.text.clone());
    }

    Self {
      embedder,
      scorer,
      avgdl_basis: entries.len(),
      texts,
    }
  }

  fn upsert(&mut self, entry: &FtsEntry) {
    self.scorer.upsert(&entry.id, self.embedder.embed(&entry.text));
    self.texts.insert(entry.id.clone(), entry.text.clone());
  }

  /// The scorer cannot drop a document, so removal tombstones the id in
  /// `texts`; ghosts are filtered at search time and purged on the next
  /// rebuild.
  fn remove(&mut self, id: &str) {
    self.texts.remove(id);
  }

  /// Rebuild the index when the corpus drifted enough (>10%) that the
  /// stored avgdl skews scoring. Also purges tombstoned documents.
  fn recalibrate_if_needed(&mut self) {
    let current = self.texts.len();
    let basis = self.avgdl_basis.max(1);
    let drift = current.abs_diff(self.avgdl_basis) as f32 / basis as f32;
    if drift <= 0.1 || current == 0 {
      return;
    }

    let entries: Vec<FtsEntry> = self
      .texts
      .iter()
      .map(|(id, text)| FtsEntry {
        id: id.clone(),
        path: String::new(),
        text: text.clone(),
      })
      .collect();
    *self = Self::build(&entries);
  }

  fn search(&self, query: &str, k: usize) -> Vec<(String, f32)> {
    let embedding = self.embedder.embed(query);
    self
      .scorer
      .matches(&embedding)
      .into_iter()
      .filter(|doc| self.texts.contains_key(&doc.id))
      .take(k)
      .map(|doc| (doc.id, doc.score))
      .collect()
  }
}

// ============================================================================
// FtsStore
// ============================================================================

pub struct FtsStore {
  table: lancedb::Table,
  backend: FtsBackendKind,
  memory: Option<RwLock<MemoryIndex>>,
}

impl FtsStore {
  /// Create or attach the FTS state at `dir`, selecting a backend from
  /// the configured choice and current corpus size.
  pub async fn open(dir: &Path, choice: FtsEngineChoice, corpus_size: usize) -> Result<Self> {
    tokio::fs::create_dir_all(dir).await?;
    let connection = connect(dir.to_string_lossy().as_ref()).execute().await?;

    let names = connection.table_names().execute().await?;
    let table = if names.contains(&FTS_TABLE.to_string()) {
      connection.open_table(FTS_TABLE).execute().await?
    } else {
      connection.create_empty_table(FTS_TABLE, fts_schema()).execute().await?
    };

    let backend = select_backend(choice, corpus_size);
    let memory = match backend {
      FtsBackendKind::Native => {
        ensure_native_index(&table).await?;
        None
      }
      FtsBackendKind::InProcess => {
        let entries = scan_entries(&table, None).await?;
        debug!(entries = entries.len(), "Hydrating in-process BM25 index");
        Some(RwLock::new(MemoryIndex::build(&entries)))
      }
    };

    Ok(Self { table, backend, memory })
  }

  pub fn backend(&self) -> FtsBackendKind {
    self.backend
  }

  /// Replace entries by id in the catalog and the active backend.
  pub async fn upsert(&self, entries: &[FtsEntry]) -> Result<()> {
    if entries.is_empty() {
      return Ok(());
    }

    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
    self.delete_rows(&ids).await?;

    let batch = entries_to_batch(entries)?;
    let iter = RecordBatchIterator::new(vec![Ok(batch)], fts_schema());
    self.table.add(Box::new(iter)).execute().await?;

    if let Some(memory) = &self.memory {
      let mut index = memory.write().await;
      for entry in entries {
        index.upsert(entry);
      }
      index.recalibrate_if_needed();
    }
    Ok(())
  }

  /// Remove a single entry by id.
  pub async fn delete(&self, id: &str) -> Result<()> {
    self.delete_many(&[id.to_string()]).await
  }

  /// Batch removal by id from the catalog and the active backend.
  pub async fn delete_many(&self, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
      return Ok(());
    }
    if let Some(memory) = &self.memory {
      let mut index = memory.write().await;
      for id in ids {
        index.remove(id);
      }
    }
    self.delete_rows(ids).await
  }

  async fn delete_rows(&self, ids: &[String]) -> Result<()> {
    let list: Vec<String> = ids.iter().map(|id| format!("'{}'", quote(id))).collect();
    self.table.delete(&format!("id IN ({})", list.join(", "))).await?;
    Ok(())
  }

  /// Remove every entry for a project-relative path.
  pub async fn delete_by_path(&self, path: &str) -> Result<()> {
    let filter = format!("path = '{}'", quote(path));

    if let Some(memory) = &self.memory {
      let doomed = scan_entries(&self.table, Some(&filter)).await?;
      let mut index = memory.write().await;
      for entry in &doomed {
        index.remove(&entry.id);
      }
    }

    self.table.delete(&filter).await?;
    Ok(())
  }

  /// BM25 search returning `(id, score)` pairs, best first.
  pub async fn search(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
    match &self.memory {
      Some(memory) => Ok(memory.read().await.search(query, k)),
      None => self.search_native(query, k).await,
    }
  }

  pub async fn count(&self) -> Result<usize> {
    Ok(self.table.count_rows(None).await?)
  }

  async fn search_native(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
    let batches: Vec<RecordBatch> = self
      .table
      .query()
      .full_text_search(FullTextSearchQuery::new(query.to_string()))
      .limit(k)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut hits = Vec::new();
    for batch in batches {
      let ids = batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Corrupt("fts catalog missing id column".into()))?;
      let scores = batch
        .column_by_name("_score")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .cloned();
      for row in 0..batch.num_rows() {
        let score = scores.as_ref().map(|a| a.value(row)).unwrap_or(0.0);
        hits.push((ids.value(row).to_string(), score));
      }
    }

    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    Ok(hits)
  }
}

/// Build the native full-text index over `text` if it does not exist yet.
async fn ensure_native_index(table: &lancedb::Table) -> Result<()> {
  let indices = table.list_indices().await?;
  if indices.iter().any(|idx| idx.columns.iter().any(|c| c == "text")) {
    return Ok(());
  }
  match table.create_index(&["text"], Index::FTS(FtsIndexBuilder::default())).execute().await {
    Ok(()) => Ok(()),
    // An empty table cannot be indexed yet; the index is created on the
    // next open once rows exist, and unindexed rows are still searchable.
    Err(e) => {
      warn!(error = %e, "Deferred native FTS index creation");
      Ok(())
    }
  }
}

async fn scan_entries(table: &lancedb::Table, filter: Option<&str>) -> Result<Vec<FtsEntry>> {
  let query = match filter {
    Some(f) => table.query().only_if(f),
    None => table.query(),
  };
  let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

  let mut entries = Vec::new();
  for batch in batches {
    let get = |name: &str| -> Result<&StringArray> {
      batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Corrupt(format!("fts catalog missing {name} column")))
    };
    let ids = get("id")?;
    let paths = get("path")?;
    let texts = get("text")?;
    for row in 0..batch.num_rows() {
      entries.push(FtsEntry {
        id: ids.value(row).to_string(),
        path: paths.value(row).to_string(),
        text: texts.value(row).to_string(),
      });
    }
  }
  Ok(entries)
}

fn entries_to_batch(entries: &[FtsEntry]) -> Result<RecordBatch> {
  let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
  let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
  let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();

  Ok(RecordBatch::try_new(
    fts_schema(),
    vec![
      Arc::new(StringArray::from(ids)),
      Arc::new(StringArray::from(paths)),
      Arc::new(StringArray::from(texts)),
    ],
  )?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(id: &str, path: &str, text: &str) -> FtsEntry {
    FtsEntry {
      id: id.to_string(),
      path: path.to_string(),
      text: text.to_string(),
    }
  }

  #[test]
  fn test_backend_selection() {
    assert_eq!(select_backend(FtsEngineChoice::Js, 100_000), FtsBackendKind::InProcess);
    assert_eq!(select_backend(FtsEngineChoice::Native, 0), FtsBackendKind::Native);
    assert_eq!(select_backend(FtsEngineChoice::Auto, 9_999), FtsBackendKind::InProcess);
    assert_eq!(select_backend(FtsEngineChoice::Auto, 10_000), FtsBackendKind::Native);
  }

  #[tokio::test]
  async fn test_in_process_upsert_and_search() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FtsStore::open(dir.path(), FtsEngineChoice::Js, 0).await.unwrap();

    store
      .upsert(&[
        entry("1", "auth/login.ts", "export function hashPassword(password: string) {}"),
        entry("2", "db/query.ts", "export function runQuery(sql: string) {}"),
        entry("3", "auth/session.ts", "class SessionStore { revoke() {} }"),
      ])
      .await
      .unwrap();

    let hits = store.search("hashPassword", 10).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].0, "1");
    assert_eq!(store.count().await.unwrap(), 3);
  }

  #[tokio::test]
  async fn test_in_process_delete_by_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FtsStore::open(dir.path(), FtsEngineChoice::Js, 0).await.unwrap();

    store
      .upsert(&[
        entry("1", "a.ts", "alpha beta"),
        entry("2", "a.ts", "gamma delta"),
        entry("3", "b.ts", "alpha omega"),
      ])
      .await
      .unwrap();

    store.delete_by_path("a.ts").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);

    let hits = store.search("alpha", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "3");
  }

  #[tokio::test]
  async fn test_delete_and_delete_many() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FtsStore::open(dir.path(), FtsEngineChoice::Js, 0).await.unwrap();

    store
      .upsert(&[
        entry("1", "a.ts", "alpha one"),
        entry("2", "b.ts", "alpha two"),
        entry("3", "c.ts", "alpha three"),
      ])
      .await
      .unwrap();

    store.delete("1").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(store.search("alpha", 10).await.unwrap().iter().all(|(id, _)| id != "1"));

    store.delete_many(&["2".to_string(), "3".to_string()]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.search("alpha", 10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_hydrates_from_catalog_on_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    {
      let store = FtsStore::open(dir.path(), FtsEngineChoice::Js, 0).await.unwrap();
      store.upsert(&[entry("1", "a.ts", "persistent lexical entry")]).await.unwrap();
    }

    let reopened = FtsStore::open(dir.path(), FtsEngineChoice::Js, 1).await.unwrap();
    let hits = reopened.search("lexical", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "1");
  }

  #[tokio::test]
  async fn test_upsert_replaces_by_id() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FtsStore::open(dir.path(), FtsEngineChoice::Js, 0).await.unwrap();

    store.upsert(&[entry("1", "a.ts", "original contents")]).await.unwrap();
    store.upsert(&[entry("1", "a.ts", "replacement contents")]).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.search("original", 5).await.unwrap().is_empty());
    assert_eq!(store.search("replacement", 5).await.unwrap().len(), 1);
  }
}
