//! Project-level orchestration over the code and docs managers.
//!
//! A [`ProjectIndex`] owns both managers plus the config and metadata
//! documents for one project. It is the only writer of fingerprints and
//! metadata; errors during `create_index` abort before metadata is
//! written, so a failed build never looks complete.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{IndexManager, IndexSummary, scanner};
use crate::{
  domain::{ChunkKind, IndexConfig, IndexMetadata, ModelIdentity, ProjectId, project as paths},
  embedding::{self, EmbeddingEngine, ProgressFn},
  error::{ErrorTag, Result, SearchError},
  logging,
  search::{self, ProcessedHit, SearchRequest},
};

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
  pub indexed_files: usize,
  pub skipped_files: usize,
  pub total_chunks: usize,
  pub total_doc_chunks: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
  pub project_root: String,
  pub total_chunks: usize,
  pub total_doc_chunks: usize,
  pub last_code_index: Option<chrono::DateTime<Utc>>,
  pub last_docs_index: Option<chrono::DateTime<Utc>>,
  pub storage_bytes: u64,
  #[serde(flatten)]
  pub models: ModelIdentity,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

// ============================================================================
// ProjectIndex
// ============================================================================

pub struct ProjectIndex {
  root: PathBuf,
  project_id: ProjectId,
  index_dir: PathBuf,
  config: IndexConfig,
  code: IndexManager,
  docs: Option<IndexManager>,
}

impl ProjectIndex {
  /// Open the index for the project containing `project_dir`, loading
  /// the process-wide embedding engines (fatal when model init fails).
  pub async fn open(project_dir: &Path) -> Result<Arc<Self>> {
    let code_engine = embedding::code_engine(None).await?;
    let docs_engine = embedding::docs_engine(None).await?;
    Self::open_with_engines(project_dir, code_engine, docs_engine).await
  }

  /// Open with explicit engines (the seam tests use to avoid model
  /// downloads).
  pub async fn open_with_engines(
    project_dir: &Path,
    code_engine: Arc<dyn EmbeddingEngine>,
    docs_engine: Arc<dyn EmbeddingEngine>,
  ) -> Result<Arc<Self>> {
    let root = paths::detect_project_root(project_dir)?;
    let project_id = ProjectId::from_path(&root);
    let index_dir = project_id.index_dir();

    if let Err(e) = logging::bind_index_dir(&index_dir) {
      tracing::warn!(error = %e, "Could not bind log sink to index directory");
    }

    let config = IndexConfig::load(&index_dir)?;
    let code = IndexManager::open(ChunkKind::Code, &root, &index_dir, &config, code_engine).await?;
    let docs = if config.index_docs {
      Some(IndexManager::open(ChunkKind::Doc, &root, &index_dir, &config, docs_engine).await?)
    } else {
      None
    };

    info!(project = %project_id, root = %root.display(), "Project index opened");
    Ok(Arc::new(Self {
      root,
      project_id,
      index_dir,
      config,
      code,
      docs,
    }))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn project_id(&self) -> &ProjectId {
    &self.project_id
  }

  pub fn index_dir(&self) -> &Path {
    &self.index_dir
  }

  pub fn config(&self) -> &IndexConfig {
    &self.config
  }

  pub fn manager(&self, kind: ChunkKind) -> Option<&IndexManager> {
    match kind {
      ChunkKind::Code => Some(&self.code),
      ChunkKind::Doc => self.docs.as_ref(),
    }
  }

  /// Classify a project-relative path under the current policy.
  pub fn classify(&self, rel_path: &str) -> Result<Option<ChunkKind>> {
    Ok(scanner::ScanPolicy::from_config(&self.config)?.classify(rel_path))
  }

  // ==========================================================================
  // Build / Rebuild
  // ==========================================================================

  /// Enumerate, chunk, embed, and store the whole project, then persist
  /// fingerprints and metadata. Nothing is written to metadata until the
  /// build succeeds.
  pub async fn create_index(&self, on_progress: Option<ProgressFn>) -> Result<IndexReport> {
    let policy = scanner::ScanPolicy::from_config(&self.config)?;
    let outcome = scanner::enumerate(&self.root, &policy)?;

    let code_files: Vec<_> = outcome.files.iter().filter(|f| f.kind == ChunkKind::Code).cloned().collect();
    let doc_files: Vec<_> = outcome.files.iter().filter(|f| f.kind == ChunkKind::Doc).cloned().collect();

    let code_summary = self.code.index_files(&code_files, on_progress.clone()).await?;
    let docs_summary = match &self.docs {
      Some(docs) => docs.index_files(&doc_files, on_progress).await?,
      None => IndexSummary::default(),
    };

    // Config is user-owned: write it only when creating it for the
    // first time.
    if !self.index_dir.join(crate::domain::config::CONFIG_FILE).exists() {
      self.config.save(&self.index_dir)?;
    }
    self.write_metadata(true, self.docs.is_some()).await?;

    Ok(IndexReport {
      indexed_files: code_summary.indexed_files + docs_summary.indexed_files,
      skipped_files: code_summary.skipped_files + docs_summary.skipped_files,
      total_chunks: self.code.chunk_count().await?,
      total_doc_chunks: match &self.docs {
        Some(docs) => docs.chunk_count().await?,
        None => 0,
      },
      warning: outcome.warning,
    })
  }

  /// Delete-then-create, preserving configuration.
  pub async fn reindex(&self, on_progress: Option<ProgressFn>) -> Result<IndexReport> {
    self.code.clear().await?;
    if let Some(docs) = &self.docs {
      docs.clear().await?;
    }
    self.create_index(on_progress).await
  }

  /// Remove the entire index directory for a project.
  pub fn delete_index(project_dir: &Path) -> Result<()> {
    let root = paths::detect_project_root(project_dir)?;
    let index_dir = ProjectId::from_path(&root).index_dir();
    if !index_dir.exists() {
      return Err(SearchError::new(
        ErrorTag::IndexNotFound,
        "No index exists for this project",
        format!("missing {}", index_dir.display()),
      ));
    }
    logging::unbind();
    std::fs::remove_dir_all(&index_dir)
      .map_err(|e| SearchError::from_io(&e, "Could not delete the index directory", &index_dir))?;
    info!(path = %index_dir.display(), "Index deleted");
    Ok(())
  }

  async fn write_metadata(&self, touched_code: bool, touched_docs: bool) -> Result<()> {
    let mut metadata = if IndexMetadata::exists(&self.index_dir) {
      IndexMetadata::load(&self.index_dir)?
    } else {
      IndexMetadata::default()
    };

    let now = Utc::now();
    if touched_code {
      metadata.last_code_index = Some(now);
    }
    if touched_docs {
      metadata.last_docs_index = Some(now);
    }
    metadata.total_chunks = self.code.chunk_count().await?;
    metadata.total_doc_chunks = match &self.docs {
      Some(docs) => docs.chunk_count().await?,
      None => 0,
    };
    metadata.models = ModelIdentity::runtime();
    metadata.storage_bytes = directory_bytes(&self.index_dir);
    metadata.save(&self.index_dir)
  }

  // ==========================================================================
  // Incremental Updates
  // ==========================================================================

  /// Route a single-file update to the right manager. Unknown or
  /// policy-excluded paths are ignored.
  pub async fn update_file(&self, kind: ChunkKind, rel_path: &str) -> Result<super::UpdateOutcome> {
    let Some(manager) = self.manager(kind) else {
      return Ok(super::UpdateOutcome::Skipped);
    };
    let outcome = manager.update_file(rel_path).await?;
    if matches!(outcome, super::UpdateOutcome::Indexed { .. }) {
      self.write_metadata(kind == ChunkKind::Code, kind == ChunkKind::Doc).await?;
    }
    Ok(outcome)
  }

  pub async fn remove_file(&self, kind: ChunkKind, rel_path: &str) -> Result<()> {
    let Some(manager) = self.manager(kind) else {
      return Ok(());
    };
    manager.remove_file(rel_path).await?;
    self.write_metadata(kind == ChunkKind::Code, kind == ChunkKind::Doc).await
  }

  // ==========================================================================
  // Search & Status
  // ==========================================================================

  /// Search one kind. Blocks with a tagged error when the stored model
  /// identity does not match the runtime constants.
  pub async fn search(&self, kind: ChunkKind, request: &SearchRequest) -> Result<Vec<ProcessedHit>> {
    let metadata = IndexMetadata::load(&self.index_dir)?;
    metadata.ensure_compatible()?;

    let manager = self.manager(kind).ok_or_else(|| {
      SearchError::new(
        ErrorTag::IndexNotFound,
        "Docs indexing is disabled for this project",
        "docs manager not constructed (indexDocs=false)",
      )
    })?;

    search::run_search(
      manager.engine(),
      manager.vectors(),
      manager.fts(),
      request,
      self.config.hybrid_search.default_alpha,
    )
    .await
  }

  /// Indexed paths matching a glob, across both fingerprint maps.
  pub async fn search_by_path(&self, pattern: &str) -> Result<Vec<String>> {
    let globs = scanner::build_globset(&[pattern.to_string()])?;
    let mut matches: Vec<String> = Vec::new();
    for path in self.code.fingerprinted_paths().await {
      if globs.is_match(&path) {
        matches.push(path);
      }
    }
    if let Some(docs) = &self.docs {
      for path in docs.fingerprinted_paths().await {
        if globs.is_match(&path) {
          matches.push(path);
        }
      }
    }
    matches.sort();
    matches.dedup();
    Ok(matches)
  }

  /// Counts, timestamps, sizes, and a non-blocking model-compatibility
  /// warning.
  pub async fn status(&self) -> Result<StatusReport> {
    let metadata = IndexMetadata::load(&self.index_dir)?;
    Ok(StatusReport {
      project_root: self.root.display().to_string(),
      total_chunks: self.code.chunk_count().await?,
      total_doc_chunks: match &self.docs {
        Some(docs) => docs.chunk_count().await?,
        None => 0,
      },
      last_code_index: metadata.last_code_index,
      last_docs_index: metadata.last_docs_index,
      storage_bytes: directory_bytes(&self.index_dir),
      models: metadata.models.clone(),
      warning: metadata.compatibility_warning(),
    })
  }
}

/// Total size of every file under a directory.
fn directory_bytes(dir: &Path) -> u64 {
  walkdir::WalkDir::new(dir)
    .into_iter()
    .filter_map(|entry| entry.ok())
    .filter_map(|entry| entry.metadata().ok())
    .filter(|metadata| metadata.is_file())
    .map(|metadata| metadata.len())
    .sum()
}
