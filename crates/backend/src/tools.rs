//! Tool handlers for the AI-host surface.
//!
//! Each tool takes a JSON argument object and returns a JSON result; the
//! transport (stdio loop, MCP registration, schemas) stays outside the
//! core. The handler owns the project context implicitly: tools operate
//! on the project containing the directory the handler was created for.

use std::{path::PathBuf, sync::Arc, time::Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::{
  domain::ChunkKind,
  embedding::EmbeddingEngine,
  error::{ErrorTag, Result, SearchError},
  manager::ProjectIndex,
  search::{CompactResponse, SearchMode, SearchRequest, SearchResponse},
  watcher::{DEBOUNCE, FileWatcher, WatcherHandle},
};

// ============================================================================
// Parameters
// ============================================================================

const MIN_TOP_K: usize = 1;
const MAX_TOP_K: usize = 50;
const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchToolParams {
  query: String,
  #[serde(default, alias = "top_k")]
  top_k: Option<usize>,
  #[serde(default)]
  mode: Option<SearchMode>,
  #[serde(default)]
  alpha: Option<f32>,
  #[serde(default)]
  compact: bool,
}

impl SearchToolParams {
  fn parse(args: Value) -> Result<Self> {
    let params: SearchToolParams = serde_json::from_value(args).map_err(|e| {
      SearchError::new(ErrorTag::InvalidPattern, "Invalid search parameters", e.to_string())
    })?;
    if params.query.trim().is_empty() {
      return Err(SearchError::new(
        ErrorTag::InvalidPattern,
        "Search query must not be empty",
        "empty query string",
      ));
    }
    if let Some(top_k) = params.top_k {
      if !(MIN_TOP_K..=MAX_TOP_K).contains(&top_k) {
        return Err(SearchError::new(
          ErrorTag::InvalidPattern,
          format!("top_k must be between {MIN_TOP_K} and {MAX_TOP_K}"),
          format!("top_k={top_k}"),
        ));
      }
    }
    if let Some(alpha) = params.alpha {
      if !(0.0..=1.0).contains(&alpha) {
        return Err(SearchError::new(
          ErrorTag::InvalidPattern,
          "alpha must be between 0 and 1",
          format!("alpha={alpha}"),
        ));
      }
    }
    Ok(params)
  }

  fn into_request(self) -> SearchRequest {
    SearchRequest {
      query: self.query,
      top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
      mode: self.mode.unwrap_or_default(),
      alpha: self.alpha,
      compact: self.compact,
    }
  }
}

#[derive(Debug, Deserialize)]
struct PathToolParams {
  pattern: String,
}

// ============================================================================
// ToolHandler
// ============================================================================

struct ActiveIndex {
  index: Arc<ProjectIndex>,
  watcher: Option<WatcherHandle>,
}

/// Handler for tool calls against one implicit project.
pub struct ToolHandler {
  project_dir: PathBuf,
  engines: Option<(Arc<dyn EmbeddingEngine>, Arc<dyn EmbeddingEngine>)>,
  state: Mutex<Option<ActiveIndex>>,
}

impl ToolHandler {
  pub fn new(project_dir: PathBuf) -> Self {
    Self {
      project_dir,
      engines: None,
      state: Mutex::new(None),
    }
  }

  /// Construct with explicit engines instead of the process singletons.
  pub fn with_engines(
    project_dir: PathBuf,
    code_engine: Arc<dyn EmbeddingEngine>,
    docs_engine: Arc<dyn EmbeddingEngine>,
  ) -> Self {
    Self {
      project_dir,
      engines: Some((code_engine, docs_engine)),
      state: Mutex::new(None),
    }
  }

  /// Dispatch a tool call by name.
  pub async fn handle(&self, tool: &str, args: Value) -> Result<Value> {
    match tool {
      "create_index" => self.create_index().await,
      "reindex_project" => self.reindex_project().await,
      "delete_index" => self.delete_index().await,
      "search_code" => self.search_code(args).await,
      "search_docs" => self.search_docs(args).await,
      "search_by_path" => self.search_by_path(args).await,
      "get_index_status" => self.get_index_status().await,
      other => Err(SearchError::new(
        ErrorTag::InvalidPattern,
        format!("Unknown tool: {other}"),
        format!("tool {other:?} not registered"),
      )),
    }
  }

  async fn open_index(&self) -> Result<Arc<ProjectIndex>> {
    let mut state = self.state.lock().await;
    if let Some(active) = state.as_ref() {
      return Ok(active.index.clone());
    }
    let index = match &self.engines {
      Some((code, docs)) => ProjectIndex::open_with_engines(&self.project_dir, code.clone(), docs.clone()).await?,
      None => ProjectIndex::open(&self.project_dir).await?,
    };
    *state = Some(ActiveIndex {
      index: index.clone(),
      watcher: None,
    });
    Ok(index)
  }

  /// Build both indexes and start the watcher.
  pub async fn create_index(&self) -> Result<Value> {
    let index = self.open_index().await?;
    let report = index.create_index(None).await?;

    let mut state = self.state.lock().await;
    if let Some(active) = state.as_mut() {
      if active.watcher.is_none() {
        active.watcher = Some(FileWatcher::start(&index, DEBOUNCE)?);
      }
    }
    Ok(serde_json::to_value(report).expect("report serializes"))
  }

  /// Full rebuild, preserving configuration.
  pub async fn reindex_project(&self) -> Result<Value> {
    let index = self.open_index().await?;
    let report = index.reindex(None).await?;
    Ok(serde_json::to_value(report).expect("report serializes"))
  }

  /// Stop watching and remove the index directory.
  pub async fn delete_index(&self) -> Result<Value> {
    let mut state = self.state.lock().await;
    if let Some(active) = state.take() {
      if let Some(watcher) = active.watcher {
        watcher.stop().await;
      }
    }
    drop(state);

    ProjectIndex::delete_index(&self.project_dir)?;
    Ok(json!({ "deleted": true }))
  }

  pub async fn search_code(&self, args: Value) -> Result<Value> {
    self.search(ChunkKind::Code, args).await
  }

  pub async fn search_docs(&self, args: Value) -> Result<Value> {
    self.search(ChunkKind::Doc, args).await
  }

  async fn search(&self, kind: ChunkKind, args: Value) -> Result<Value> {
    let request = SearchToolParams::parse(args)?.into_request();
    let index = self.open_index().await?;

    let started = Instant::now();
    let hits = index.search(kind, &request).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let response = SearchResponse::from_hits(hits, elapsed_ms, None);
    let value = if request.compact {
      serde_json::to_value(CompactResponse::from(&response))
    } else {
      serde_json::to_value(response)
    };
    Ok(value.expect("response serializes"))
  }

  /// Glob match over indexed paths; no embedding involved.
  pub async fn search_by_path(&self, args: Value) -> Result<Value> {
    let params: PathToolParams = serde_json::from_value(args).map_err(|e| {
      SearchError::new(ErrorTag::InvalidPattern, "Invalid search_by_path parameters", e.to_string())
    })?;
    let index = self.open_index().await?;
    let paths = index.search_by_path(&params.pattern).await?;
    Ok(json!({ "paths": paths, "totalResults": paths.len() }))
  }

  pub async fn get_index_status(&self) -> Result<Value> {
    let index = self.open_index().await?;
    let status = index.status().await?;
    Ok(serde_json::to_value(status).expect("status serializes"))
  }

  /// Stop the watcher if running (used on shutdown).
  pub async fn shutdown(&self) {
    let mut state = self.state.lock().await;
    if let Some(active) = state.as_mut() {
      if let Some(watcher) = active.watcher.take() {
        watcher.stop().await;
      }
    }
  }
}
