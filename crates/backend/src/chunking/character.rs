//! Character-window chunker.
//!
//! Slides a ~4000-character window over the file with ~800 characters of
//! overlap, preferring to split at blank lines (double newlines) inside
//! the window. Operates line-by-line so chunk boundaries always land on
//! line breaks and line numbers stay exact.

use super::{TextChunk, make_chunk};

pub const WINDOW_CHARS: usize = 4000;
pub const OVERLAP_CHARS: usize = 800;

/// Chunk content with the default window and overlap.
pub fn chunk_characters(content: &str) -> Vec<TextChunk> {
  chunk_window(content, WINDOW_CHARS, OVERLAP_CHARS)
}

/// Chunk content with an explicit window and overlap (the code-aware
/// chunker reuses this with a reduced overlap for oversized declarations).
pub(crate) fn chunk_window(content: &str, window: usize, overlap: usize) -> Vec<TextChunk> {
  let lines: Vec<&str> = content.lines().collect();
  if lines.is_empty() {
    return Vec::new();
  }

  // +1 per line for the newline the window consumed in the source.
  let line_cost = |i: usize| lines[i].len() + 1;

  let mut chunks = Vec::new();
  let mut start = 0usize;

  while start < lines.len() {
    // Grow the window; always take at least one line so a single long
    // line still makes progress.
    let mut end = start;
    let mut used = line_cost(start);
    while end + 1 < lines.len() && used + line_cost(end + 1) <= window {
      end += 1;
      used += line_cost(end);
    }

    let at_eof = end + 1 >= lines.len();

    // Prefer splitting at the last blank line inside the window.
    if !at_eof {
      if let Some(blank) = (start + 1..=end).rev().find(|&i| lines[i].trim().is_empty()) {
        if blank > start {
          end = blank - 1;
        }
      }
    }

    if let Some(chunk) = make_chunk(&lines, start, end) {
      chunks.push(chunk);
    }

    if at_eof {
      break;
    }

    // Step back over ~overlap characters for the next window start.
    let mut next = end + 1;
    let mut back = 0usize;
    while next > start + 1 && back < overlap {
      next -= 1;
      back += line_cost(next);
    }
    start = next.max(start + 1);
  }

  chunks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input() {
    assert!(chunk_characters("").is_empty());
    assert!(chunk_characters("\n\n\n").is_empty());
  }

  #[test]
  fn test_small_file_single_chunk() {
    let chunks = chunk_characters("line one\nline two\n");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].start_line, 1);
    assert_eq!(chunks[0].end_line, 2);
  }

  #[test]
  fn test_prefers_blank_line_split() {
    // Two paragraphs that together exceed the window: the split must land
    // on the blank line between them, not mid-paragraph.
    let para_a = "aaaaaaaaaa\n".repeat(30);
    let para_b = "bbbbbbbbbb\n".repeat(30);
    let content = format!("{para_a}\n{para_b}");

    let chunks = chunk_window(&content, 400, 50);
    assert!(chunks.len() >= 2);
    assert!(chunks[0].text.lines().all(|l| l.starts_with('a')));
    assert_eq!(chunks[0].end_line, 30);
  }

  #[test]
  fn test_overlap_regions() {
    let content = "0123456789\n".repeat(100);
    let chunks = chunk_window(&content, 220, 44);
    assert!(chunks.len() > 1);

    // Consecutive chunks overlap by roughly overlap/line_cost lines.
    for pair in chunks.windows(2) {
      assert!(pair[1].start_line <= pair[0].end_line + 1);
      assert!(pair[1].start_line > pair[0].start_line);
    }
  }

  #[test]
  fn test_single_long_line_progresses() {
    let content = format!("{}\nshort\n", "x".repeat(10_000));
    let chunks = chunk_window(&content, 400, 100);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].start_line, 1);
    assert_eq!(chunks[1].start_line, 2);
  }

  #[test]
  fn test_trims_blank_boundaries() {
    let chunks = chunk_characters("\n\nfn main() {}\n\n");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].start_line, 3);
    assert_eq!(chunks[0].text, "fn main() {}");
  }
}
