//! Reciprocal Rank Fusion of the vector and lexical candidate lists.
//!
//! `score(d) = α · 1/(c + rank_vec(d)) + (1-α) · 1/(c + rank_fts(d))`
//! with `c = 60` and 1-based ranks. Modes `vector` and `fts` pin α to 1
//! or 0, which makes the fused ordering exactly equal the corresponding
//! single-list ranking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::Chunk;

/// RRF rank constant.
pub const RRF_C: f32 = 60.0;

/// Candidate pool multiplier: both legs fetch `k × OVER_FETCH`, capped.
pub const OVER_FETCH: usize = 3;
pub const MAX_POOL: usize = 50;

/// How many candidates each leg should fetch for a requested `k`.
pub fn pool_size(k: usize) -> usize {
  (k * OVER_FETCH).clamp(k, MAX_POOL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
  Vector,
  Fts,
  #[default]
  Hybrid,
}

impl SearchMode {
  /// The α this mode pins, if any.
  pub fn fixed_alpha(&self) -> Option<f32> {
    match self {
      SearchMode::Vector => Some(1.0),
      SearchMode::Fts => Some(0.0),
      SearchMode::Hybrid => None,
    }
  }
}

/// A fused candidate carrying its provenance: which lists it appeared in,
/// at what ranks, and its normalized vector similarity when available.
#[derive(Debug, Clone)]
pub struct FusedHit {
  pub chunk: Chunk,
  pub score: f32,
  pub vector_rank: Option<usize>,
  pub fts_rank: Option<usize>,
  pub similarity: Option<f32>,
}

/// Fuse the two ranked lists and truncate to `k`.
///
/// `vector_hits` carry chunk payloads and normalized similarities;
/// `fts_hits` carry ids only, resolved through `by_id` (chunks fetched
/// from the vector store for ids the vector leg did not return).
pub fn fuse(
  vector_hits: &[(Chunk, f32)],
  fts_hits: &[(String, f32)],
  by_id: &HashMap<String, Chunk>,
  alpha: f32,
  k: usize,
) -> Vec<FusedHit> {
  let alpha = alpha.clamp(0.0, 1.0);
  let mut fused: HashMap<String, FusedHit> = HashMap::new();

  for (rank0, (chunk, similarity)) in vector_hits.iter().enumerate() {
    let rank = rank0 + 1;
    let contribution = alpha * rrf_term(rank);
    fused
      .entry(chunk.id.to_string())
      .and_modify(|hit| {
        hit.score += contribution;
        hit.vector_rank = Some(rank);
        hit.similarity = Some(*similarity);
      })
      .or_insert_with(|| FusedHit {
        chunk: chunk.clone(),
        score: contribution,
        vector_rank: Some(rank),
        fts_rank: None,
        similarity: Some(*similarity),
      });
  }

  for (rank0, (id, _score)) in fts_hits.iter().enumerate() {
    let rank = rank0 + 1;
    let contribution = (1.0 - alpha) * rrf_term(rank);
    if let Some(hit) = fused.get_mut(id) {
      hit.score += contribution;
      hit.fts_rank = Some(rank);
      continue;
    }
    let Some(chunk) = by_id.get(id) else {
      // The id vanished between the FTS read and the chunk fetch (an
      // in-flight delete); skew tolerance says drop it.
      continue;
    };
    fused.insert(
      id.clone(),
      FusedHit {
        chunk: chunk.clone(),
        score: contribution,
        vector_rank: None,
        fts_rank: Some(rank),
        similarity: None,
      },
    );
  }

  let mut hits: Vec<FusedHit> = fused.into_values().collect();
  hits.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.chunk.id.cmp(&b.chunk.id))
  });
  hits.truncate(k);
  hits
}

fn rrf_term(rank: usize) -> f32 {
  1.0 / (RRF_C + rank as f32)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ChunkKind;

  fn chunk(path: &str) -> Chunk {
    Chunk::new(path, 1, 1, format!("content of {path}"), "fp", ChunkKind::Code)
  }

  fn lookup(chunks: &[Chunk]) -> HashMap<String, Chunk> {
    chunks.iter().map(|c| (c.id.to_string(), c.clone())).collect()
  }

  #[test]
  fn test_alpha_one_equals_vector_ranking() {
    let a = chunk("a.rs");
    let b = chunk("b.rs");
    let c = chunk("c.rs");
    let vector = vec![(a.clone(), 0.9), (b.clone(), 0.8), (c.clone(), 0.7)];
    // FTS disagrees completely.
    let fts = vec![(c.id.to_string(), 9.0), (b.id.to_string(), 5.0), (a.id.to_string(), 1.0)];

    let fused = fuse(&vector, &fts, &lookup(&[a.clone(), b.clone(), c.clone()]), 1.0, 3);
    let order: Vec<&str> = fused.iter().map(|h| h.chunk.path.as_str()).collect();
    assert_eq!(order, vec!["a.rs", "b.rs", "c.rs"]);
  }

  #[test]
  fn test_alpha_zero_equals_fts_ranking() {
    let a = chunk("a.rs");
    let b = chunk("b.rs");
    let c = chunk("c.rs");
    let vector = vec![(a.clone(), 0.9), (b.clone(), 0.8), (c.clone(), 0.7)];
    let fts = vec![(c.id.to_string(), 9.0), (b.id.to_string(), 5.0), (a.id.to_string(), 1.0)];

    let fused = fuse(&vector, &fts, &lookup(&[a.clone(), b.clone(), c.clone()]), 0.0, 3);
    let order: Vec<&str> = fused.iter().map(|h| h.chunk.path.as_str()).collect();
    assert_eq!(order, vec!["c.rs", "b.rs", "a.rs"]);
  }

  #[test]
  fn test_hybrid_rewards_agreement() {
    let agreed = chunk("agreed.rs");
    let vec_only = chunk("vec_only.rs");
    let fts_only = chunk("fts_only.rs");

    let vector = vec![(vec_only.clone(), 0.95), (agreed.clone(), 0.90)];
    let fts = vec![(fts_only.id.to_string(), 8.0), (agreed.id.to_string(), 6.0)];

    let fused = fuse(
      &vector,
      &fts,
      &lookup(&[agreed.clone(), vec_only.clone(), fts_only.clone()]),
      0.5,
      3,
    );
    assert_eq!(fused[0].chunk.path, "agreed.rs");
    assert_eq!(fused[0].vector_rank, Some(2));
    assert_eq!(fused[0].fts_rank, Some(2));
  }

  #[test]
  fn test_truncates_to_k() {
    let chunks: Vec<Chunk> = (0..10).map(|i| chunk(&format!("f{i}.rs"))).collect();
    let vector: Vec<(Chunk, f32)> = chunks.iter().map(|c| (c.clone(), 0.5)).collect();

    let fused = fuse(&vector, &[], &HashMap::new(), 1.0, 4);
    assert_eq!(fused.len(), 4);
  }

  #[test]
  fn test_missing_fts_payload_is_skipped() {
    let fts = vec![("no-such-id".to_string(), 3.0)];
    let fused = fuse(&[], &fts, &HashMap::new(), 0.0, 5);
    assert!(fused.is_empty());
  }

  #[test]
  fn test_pool_size() {
    assert_eq!(pool_size(10), 30);
    assert_eq!(pool_size(30), 50);
    assert_eq!(pool_size(1), 3);
  }
}
