//! Result post-processing: same-file merge and whitespace trim.
//!
//! Retained chunks from the same file that overlap or are adjacent
//! (`end_line + 1 >= next.start_line`) merge into a single result whose
//! text concatenates without duplicated lines and whose score is the max
//! of the members. Non-adjacent chunks from the same file stay separate.

use super::fusion::FusedHit;

/// A merged, trimmed result ready for output formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedHit {
  pub path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub text: String,
  pub score: f32,
}

/// Merge overlapping/adjacent same-file hits, trim blank boundary lines,
/// and order by descending score.
pub fn postprocess(hits: Vec<FusedHit>) -> Vec<ProcessedHit> {
  // Group by path, keeping spans sorted for the merge sweep.
  let mut by_path: Vec<(String, Vec<FusedHit>)> = Vec::new();
  for hit in hits {
    match by_path.iter_mut().find(|(path, _)| *path == hit.chunk.path) {
      Some((_, group)) => group.push(hit),
      None => by_path.push((hit.chunk.path.clone(), vec![hit])),
    }
  }

  let mut results = Vec::new();
  for (path, mut group) in by_path {
    group.sort_by_key(|h| h.chunk.start_line);

    let mut merged: Vec<ProcessedHit> = Vec::new();
    for hit in group {
      let candidate = ProcessedHit {
        path: path.clone(),
        start_line: hit.chunk.start_line,
        end_line: hit.chunk.end_line,
        text: hit.chunk.text.clone(),
        score: hit.score,
      };

      match merged.last_mut() {
        Some(last) if last.end_line + 1 >= candidate.start_line => {
          merge_into(last, &candidate);
        }
        _ => merged.push(candidate),
      }
    }

    results.extend(merged);
  }

  for result in results.iter_mut() {
    trim_result(result);
  }

  results.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.path.cmp(&b.path))
      .then_with(|| a.start_line.cmp(&b.start_line))
  });
  results
}

/// Merge `next` into `prev` without duplicating the overlapping lines.
fn merge_into(prev: &mut ProcessedHit, next: &ProcessedHit) {
  if next.end_line > prev.end_line {
    // Lines of `next` below `prev.end_line` are already present.
    let overlap_lines = (prev.end_line + 1).saturating_sub(next.start_line) as usize;
    let fresh: Vec<&str> = next.text.lines().skip(overlap_lines).collect();
    if !fresh.is_empty() {
      if !prev.text.is_empty() {
        prev.text.push('\n');
      }
      prev.text.push_str(&fresh.join("\n"));
    }
    prev.end_line = next.end_line;
  }
  prev.start_line = prev.start_line.min(next.start_line);
  prev.score = prev.score.max(next.score);
}

/// Remove leading/trailing blank lines, keeping line numbers anchored to
/// the original source.
fn trim_result(result: &mut ProcessedHit) {
  let lines: Vec<&str> = result.text.lines().collect();
  let mut start = 0usize;
  let mut end = lines.len();
  while start < end && lines[start].trim().is_empty() {
    start += 1;
  }
  while end > start && lines[end - 1].trim().is_empty() {
    end -= 1;
  }
  if start == 0 && end == lines.len() {
    return;
  }
  result.start_line += start as u32;
  result.end_line -= (lines.len() - end) as u32;
  result.text = lines[start..end].join("\n");
}
