//! Index managers.
//!
//! One [`IndexManager`] per kind (code, docs) owns that kind's vector
//! table, FTS state, and fingerprint map. All mutations serialize behind
//! a single writer lock; fingerprint comparison short-circuits updates
//! for touched-but-unchanged files. Store writes commit vector first,
//! then FTS, and retry once before propagating.

pub mod project;
pub mod scanner;

use std::{
  path::{Path, PathBuf},
  sync::{Arc, atomic::{AtomicU64, Ordering}},
};

pub use project::{IndexReport, ProjectIndex, StatusReport};
pub use scanner::{ScanPolicy, ScannedFile};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
  chunking,
  domain::{Chunk, ChunkKind, ChunkingStrategy, IndexConfig, project as paths},
  embedding::{EmbeddingEngine, ProgressFn},
  error::Result,
  fingerprint::{FingerprintMap, fingerprint_of},
  store::{FtsEntry, FtsStore, VectorStore},
};

/// Result of a single-file update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
  /// Fingerprint matched; no store was touched.
  Unchanged,
  /// File was (re)chunked and both stores replaced.
  Indexed { chunks: usize },
  /// File was rejected by per-file policy (binary, unreadable, decode).
  Skipped,
}

/// Totals for a bulk indexing pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexSummary {
  pub indexed_files: usize,
  pub skipped_files: usize,
  pub total_chunks: usize,
}

pub struct IndexManager {
  kind: ChunkKind,
  root: PathBuf,
  strategy: ChunkingStrategy,
  max_file_size: u64,
  engine: Arc<dyn EmbeddingEngine>,
  vectors: VectorStore,
  fts: FtsStore,
  fingerprints: Mutex<FingerprintMap>,
  write_lock: Mutex<()>,
  store_writes: AtomicU64,
}

impl IndexManager {
  /// Open (or create) the stores for one kind under an index directory.
  pub async fn open(
    kind: ChunkKind,
    root: &Path,
    index_dir: &Path,
    config: &IndexConfig,
    engine: Arc<dyn EmbeddingEngine>,
  ) -> Result<Self> {
    let (vectors_dir, fts_dir) = match kind {
      ChunkKind::Code => ("vectors", "fts"),
      ChunkKind::Doc => ("docs-vectors", "docs-fts"),
    };

    let vectors = VectorStore::open(&index_dir.join(vectors_dir), engine.dimension()).await?;
    let corpus = vectors.count().await?;
    let fts = FtsStore::open(&index_dir.join(fts_dir), config.hybrid_search.fts_engine, corpus).await?;
    let fingerprints = FingerprintMap::load(index_dir, kind)?;

    Ok(Self {
      kind,
      root: root.to_path_buf(),
      strategy: config.chunking_strategy,
      max_file_size: config.max_file_size_bytes(),
      engine,
      vectors,
      fts,
      fingerprints: Mutex::new(fingerprints),
      write_lock: Mutex::new(()),
      store_writes: AtomicU64::new(0),
    })
  }

  pub fn kind(&self) -> ChunkKind {
    self.kind
  }

  pub fn engine(&self) -> &dyn EmbeddingEngine {
    self.engine.as_ref()
  }

  pub fn vectors(&self) -> &VectorStore {
    &self.vectors
  }

  pub fn fts(&self) -> &FtsStore {
    &self.fts
  }

  /// How many committed store writes this manager has performed. Lets
  /// callers assert that unchanged files cause no writes.
  pub fn store_writes(&self) -> u64 {
    self.store_writes.load(Ordering::Relaxed)
  }

  pub async fn chunk_count(&self) -> Result<usize> {
    Ok(self.vectors.count().await?)
  }

  pub async fn fingerprinted_paths(&self) -> Vec<String> {
    self.fingerprints.lock().await.paths().map(String::from).collect()
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  /// Re-chunk and re-embed one file if its content hash changed.
  pub async fn update_file(&self, rel_path: &str) -> Result<UpdateOutcome> {
    let _guard = self.write_lock.lock().await;
    self.update_file_locked(rel_path).await
  }

  async fn update_file_locked(&self, rel_path: &str) -> Result<UpdateOutcome> {
    let abs = paths::safe_join(&self.root, rel_path)?;

    let bytes = match tokio::fs::read(&abs).await {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(path = %rel_path, error = %e, "Skipping unreadable file");
        return Ok(UpdateOutcome::Skipped);
      }
    };

    if bytes.len() as u64 > self.max_file_size {
      debug!(path = %rel_path, size = bytes.len(), "Skipping oversized file");
      return Ok(UpdateOutcome::Skipped);
    }
    if scanner::looks_binary(&bytes) {
      debug!(path = %rel_path, "Skipping binary file");
      return Ok(UpdateOutcome::Skipped);
    }
    let content = match String::from_utf8(bytes) {
      Ok(content) => content,
      Err(_) => {
        warn!(path = %rel_path, "Skipping file with invalid encoding");
        return Ok(UpdateOutcome::Skipped);
      }
    };

    let fingerprint = fingerprint_of(content.as_bytes());
    if self.fingerprints.lock().await.get(rel_path) == Some(fingerprint.as_str()) {
      return Ok(UpdateOutcome::Unchanged);
    }

    let ext = Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("");
    let text_chunks = chunking::chunk_file(&content, ext, self.kind, self.strategy);

    let chunks: Vec<Chunk> = text_chunks
      .into_iter()
      .map(|tc| Chunk::new(rel_path, tc.start_line, tc.end_line, tc.text, &fingerprint, self.kind))
      .collect();

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = self.engine.embed_batch(&texts, None).await?;
    let pairs: Vec<(Chunk, Vec<f32>)> = chunks.into_iter().zip(vectors).collect();
    let entries: Vec<FtsEntry> = pairs
      .iter()
      .map(|(chunk, _)| FtsEntry {
        id: chunk.id.to_string(),
        path: chunk.path.clone(),
        text: chunk.text.clone(),
      })
      .collect();

    self.replace_file_rows(rel_path, &pairs, &entries).await?;

    let mut fingerprints = self.fingerprints.lock().await;
    fingerprints.insert(rel_path, &fingerprint);
    fingerprints.save()?;

    debug!(path = %rel_path, chunks = pairs.len(), kind = self.kind.as_str(), "File indexed");
    Ok(UpdateOutcome::Indexed { chunks: pairs.len() })
  }

  /// Atomic per-file replace: vector store first, then FTS, each retried
  /// once.
  async fn replace_file_rows(&self, rel_path: &str, pairs: &[(Chunk, Vec<f32>)], entries: &[FtsEntry]) -> Result<()> {
    let vector_write = || async {
      self.vectors.delete_by_path(rel_path).await?;
      self.vectors.upsert_chunks(pairs).await
    };
    if let Err(first) = vector_write().await {
      warn!(path = %rel_path, error = %first, "Vector write failed, retrying once");
      vector_write().await?;
    }

    let fts_write = || async {
      self.fts.delete_by_path(rel_path).await?;
      self.fts.upsert(entries).await
    };
    if let Err(first) = fts_write().await {
      warn!(path = %rel_path, error = %first, "FTS write failed, retrying once");
      fts_write().await?;
    }

    self.store_writes.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  /// Delete every row for a path from both stores and drop its
  /// fingerprint.
  pub async fn remove_file(&self, rel_path: &str) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    self.vectors.delete_by_path(rel_path).await?;
    self.fts.delete_by_path(rel_path).await?;
    self.store_writes.fetch_add(1, Ordering::Relaxed);

    let mut fingerprints = self.fingerprints.lock().await;
    if fingerprints.remove(rel_path) {
      fingerprints.save()?;
    }
    debug!(path = %rel_path, kind = self.kind.as_str(), "File removed from index");
    Ok(())
  }

  /// Index a batch of enumerated files. Per-file failures are logged and
  /// skipped; the batch continues.
  pub async fn index_files(&self, files: &[ScannedFile], on_progress: Option<ProgressFn>) -> Result<IndexSummary> {
    let _guard = self.write_lock.lock().await;
    let total = files.len();
    let mut summary = IndexSummary::default();

    for (done, file) in files.iter().enumerate() {
      match self.update_file_locked(&file.rel_path).await {
        Ok(UpdateOutcome::Indexed { chunks }) => {
          summary.indexed_files += 1;
          summary.total_chunks += chunks;
        }
        Ok(UpdateOutcome::Unchanged) => {}
        Ok(UpdateOutcome::Skipped) => summary.skipped_files += 1,
        Err(e) => {
          warn!(path = %file.rel_path, error = %e, "File failed to index; continuing");
          summary.skipped_files += 1;
        }
      }
      if let Some(ref progress) = on_progress {
        progress(done + 1, total);
      }
    }

    info!(
      kind = self.kind.as_str(),
      indexed = summary.indexed_files,
      skipped = summary.skipped_files,
      chunks = summary.total_chunks,
      "Indexing pass complete"
    );
    Ok(summary)
  }

  /// Drop every indexed row and fingerprint (used by reindex, which
  /// preserves configuration).
  pub async fn clear(&self) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let paths: Vec<String> = self.fingerprints.lock().await.paths().map(String::from).collect();

    let mut ids = Vec::new();
    for path in &paths {
      for chunk in self.vectors.chunks_for_path(path).await? {
        ids.push(chunk.id.to_string());
      }
      self.vectors.delete_by_path(path).await?;
    }
    self.fts.delete_many(&ids).await?;

    let mut fingerprints = self.fingerprints.lock().await;
    fingerprints.clear();
    fingerprints.save()?;
    Ok(())
  }
}
