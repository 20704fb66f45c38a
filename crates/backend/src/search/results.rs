//! Output schemas.
//!
//! The default schema is the canonical record; the compact schema is a
//! view derived from it (short keys, `path:start-end` packed into a
//! single `loc` string, scores rounded to two decimals) and converts back
//! losslessly.

use serde::{Deserialize, Serialize};

use super::postprocess::ProcessedHit;
use crate::error::{ErrorTag, Result, SearchError};

// ============================================================================
// Default Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
  pub path: String,
  pub text: String,
  pub score: f32,
  pub start_line: u32,
  pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
  pub results: Vec<SearchResultItem>,
  pub total_results: usize,
  pub search_time_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

impl SearchResponse {
  pub fn from_hits(hits: Vec<ProcessedHit>, search_time_ms: u64, warning: Option<String>) -> Self {
    let results: Vec<SearchResultItem> = hits
      .into_iter()
      .map(|hit| SearchResultItem {
        path: hit.path,
        text: hit.text,
        score: round2(hit.score),
        start_line: hit.start_line,
        end_line: hit.end_line,
      })
      .collect();
    Self {
      total_results: results.len(),
      results,
      search_time_ms,
      warning,
    }
  }
}

// ============================================================================
// Compact Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactResultItem {
  /// `path:start-end`.
  pub loc: String,
  pub t: String,
  pub s: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactResponse {
  pub r: Vec<CompactResultItem>,
  pub n: usize,
  pub ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub w: Option<String>,
}

impl From<&SearchResponse> for CompactResponse {
  fn from(response: &SearchResponse) -> Self {
    Self {
      r: response
        .results
        .iter()
        .map(|item| CompactResultItem {
          loc: format!("{}:{}-{}", item.path, item.start_line, item.end_line),
          t: item.text.clone(),
          s: round2(item.score),
        })
        .collect(),
      n: response.total_results,
      ms: response.search_time_ms,
      w: response.warning.clone(),
    }
  }
}

impl CompactResponse {
  /// Recover the default schema from the compact view.
  pub fn expand(&self) -> Result<SearchResponse> {
    let mut results = Vec::with_capacity(self.r.len());
    for item in &self.r {
      let (path, start_line, end_line) = parse_loc(&item.loc)?;
      results.push(SearchResultItem {
        path,
        text: item.t.clone(),
        score: item.s,
        start_line,
        end_line,
      });
    }
    Ok(SearchResponse {
      results,
      total_results: self.n,
      search_time_ms: self.ms,
      warning: self.w.clone(),
    })
  }
}

fn parse_loc(loc: &str) -> Result<(String, u32, u32)> {
  let invalid = || {
    SearchError::new(
      ErrorTag::InvalidPattern,
      "Malformed result location",
      format!("cannot parse loc {loc:?}"),
    )
  };

  let (path, span) = loc.rsplit_once(':').ok_or_else(invalid)?;
  let (start, end) = span.split_once('-').ok_or_else(invalid)?;
  let start_line: u32 = start.parse().map_err(|_| invalid())?;
  let end_line: u32 = end.parse().map_err(|_| invalid())?;
  Ok((path.to_string(), start_line, end_line))
}

pub(crate) fn round2(value: f32) -> f32 {
  (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn sample() -> SearchResponse {
    SearchResponse {
      results: vec![
        SearchResultItem {
          path: "src/errors/index.ts".to_string(),
          text: "export class AppError {}".to_string(),
          score: 0.52,
          start_line: 1,
          end_line: 142,
        },
        SearchResultItem {
          path: "auth/login.ts".to_string(),
          text: "function login() {}".to_string(),
          score: 0.31,
          start_line: 10,
          end_line: 12,
        },
      ],
      total_results: 2,
      search_time_ms: 18,
      warning: None,
    }
  }

  #[test]
  fn test_compact_encodes_loc_and_short_keys() {
    let compact = CompactResponse::from(&sample());
    assert_eq!(compact.n, 2);
    assert_eq!(compact.r[0].loc, "src/errors/index.ts:1-142");
    assert_eq!(compact.r[0].s, 0.52);

    let json = serde_json::to_value(&compact).unwrap();
    assert!(json.get("r").is_some());
    assert!(json.get("results").is_none());
    assert!(json.get("w").is_none());
  }

  #[test]
  fn test_round_trip_is_bijective() {
    let original = sample();
    let compact = CompactResponse::from(&original);
    let expanded = compact.expand().unwrap();
    assert_eq!(expanded, original);
  }

  #[test]
  fn test_loc_with_colons_in_path() {
    let (path, start, end) = parse_loc("weird:dir/file.ts:3-9").unwrap();
    assert_eq!(path, "weird:dir/file.ts");
    assert_eq!((start, end), (3, 9));
  }

  #[test]
  fn test_malformed_loc_is_invalid_pattern() {
    let err = parse_loc("no-span-here").unwrap_err();
    assert_eq!(err.tag(), ErrorTag::InvalidPattern);
  }

  #[test]
  fn test_scores_round_to_two_decimals() {
    let hits = vec![ProcessedHit {
      path: "a.rs".to_string(),
      start_line: 1,
      end_line: 1,
      text: "x".to_string(),
      score: 0.123_456,
    }];
    let response = SearchResponse::from_hits(hits, 5, None);
    assert_eq!(response.results[0].score, 0.12);
  }
}
