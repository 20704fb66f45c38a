//! Chunking strategies.
//!
//! Two strategies are selectable per index: a character-window chunker and
//! a code-aware chunker that respects declaration boundaries for a fixed
//! set of languages. Doc files always use the doc-aware chunker. All
//! chunkers emit spans with 1-based inclusive line numbers into the
//! original source and trim leading/trailing blank lines (line numbers
//! keep referring to the untrimmed source).

pub mod character;
pub mod code;
pub mod docs;

use crate::domain::{ChunkKind, ChunkingStrategy};

/// A chunk of text with its position in the source file, before it is
/// assigned an id, path, and fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
  /// 1-based inclusive.
  pub start_line: u32,
  /// 1-based inclusive.
  pub end_line: u32,
  pub text: String,
}

/// Chunk file content according to kind and configured strategy.
///
/// `ext` is the lowercase file extension, used by the code-aware chunker
/// to pick boundary rules.
pub fn chunk_file(content: &str, ext: &str, kind: ChunkKind, strategy: ChunkingStrategy) -> Vec<TextChunk> {
  match kind {
    ChunkKind::Doc => docs::chunk_docs(content),
    ChunkKind::Code => match strategy {
      ChunkingStrategy::Character => character::chunk_characters(content),
      ChunkingStrategy::CodeAware => code::chunk_code(content, ext),
    },
  }
}

/// Trim blank boundary lines from a 0-based inclusive line range.
///
/// Returns the trimmed range, or None when every line in the range is
/// blank.
pub(crate) fn trim_blank_range(lines: &[&str], start: usize, end: usize) -> Option<(usize, usize)> {
  let mut start = start;
  let mut end = end.min(lines.len().saturating_sub(1));
  while start <= end && lines[start].trim().is_empty() {
    start += 1;
  }
  while end > start && lines[end].trim().is_empty() {
    end -= 1;
  }
  if start > end || lines[start].trim().is_empty() {
    return None;
  }
  Some((start, end))
}

/// Build a [`TextChunk`] from a 0-based inclusive line range, trimming
/// blank boundary lines. Returns None for all-blank ranges.
pub(crate) fn make_chunk(lines: &[&str], start: usize, end: usize) -> Option<TextChunk> {
  let (start, end) = trim_blank_range(lines, start, end)?;
  Some(TextChunk {
    start_line: (start + 1) as u32,
    end_line: (end + 1) as u32,
    text: lines[start..=end].join("\n"),
  })
}
