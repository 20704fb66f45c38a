//! Hybrid search orchestration.
//!
//! A query is embedded, both candidate legs are over-fetched, the ranked
//! lists fuse via Reciprocal Rank Fusion, and the fused top-k passes
//! through same-file merge and whitespace trim before formatting.

pub mod fusion;
pub mod postprocess;
pub mod results;

use std::collections::HashMap;

pub use fusion::{FusedHit, SearchMode};
pub use postprocess::ProcessedHit;
pub use results::{CompactResponse, SearchResponse};
use tracing::debug;

use crate::{
  embedding::EmbeddingEngine,
  error::Result,
  store::{FtsStore, VectorStore},
};

/// Parameters of a single search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
  pub query: String,
  pub top_k: usize,
  pub mode: SearchMode,
  pub alpha: Option<f32>,
  pub compact: bool,
}

impl Default for SearchRequest {
  fn default() -> Self {
    Self {
      query: String::new(),
      top_k: 10,
      mode: SearchMode::Hybrid,
      alpha: None,
      compact: false,
    }
  }
}

impl SearchRequest {
  /// The effective α: pinned by mode, else per-request, else configured
  /// default.
  pub fn effective_alpha(&self, default_alpha: f32) -> f32 {
    self
      .mode
      .fixed_alpha()
      .or(self.alpha)
      .unwrap_or(default_alpha)
      .clamp(0.0, 1.0)
  }
}

/// Run a search against one index (code or docs).
pub async fn run_search(
  engine: &dyn EmbeddingEngine,
  vectors: &VectorStore,
  fts: &FtsStore,
  request: &SearchRequest,
  default_alpha: f32,
) -> Result<Vec<ProcessedHit>> {
  let alpha = request.effective_alpha(default_alpha);
  let pool = fusion::pool_size(request.top_k);

  // Pure-FTS queries skip the embedding entirely; pure-vector queries
  // skip the lexical leg.
  let vector_hits = if alpha > 0.0 {
    let query_vec = engine.embed(&request.query).await?;
    vectors.search(&query_vec, pool).await?
  } else {
    Vec::new()
  };

  let fts_hits = if alpha < 1.0 {
    fts.search(&request.query, pool).await?
  } else {
    Vec::new()
  };

  debug!(
    query = %request.query,
    alpha,
    vector_candidates = vector_hits.len(),
    fts_candidates = fts_hits.len(),
    "Fusing search candidates"
  );

  // Resolve payloads for FTS-only ids out of the vector table.
  let mut by_id: HashMap<String, _> = vector_hits.iter().map(|(c, _)| (c.id.to_string(), c.clone())).collect();
  let missing: Vec<String> = fts_hits
    .iter()
    .map(|(id, _)| id.clone())
    .filter(|id| !by_id.contains_key(id))
    .collect();
  if !missing.is_empty() {
    for chunk in vectors.get_by_ids(&missing).await? {
      by_id.insert(chunk.id.to_string(), chunk);
    }
  }

  let fused = fusion::fuse(&vector_hits, &fts_hits, &by_id, alpha, request.top_k);
  Ok(postprocess::postprocess(fused))
}
