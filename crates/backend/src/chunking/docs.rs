//! Doc-aware chunker for prose files.
//!
//! Same window/overlap budget as the character chunker, but split points
//! prefer heading lines, then paragraph breaks (blank lines), so sections
//! of a document stay intact.

use super::{TextChunk, character, make_chunk};

/// Markdown-style heading at the start of a line.
fn is_heading(line: &str) -> bool {
  let trimmed = line.trim_start();
  trimmed.starts_with('#') && trimmed.trim_start_matches('#').starts_with(' ')
}

/// Chunk prose content, preferring heading and paragraph boundaries.
pub fn chunk_docs(content: &str) -> Vec<TextChunk> {
  let lines: Vec<&str> = content.lines().collect();
  if lines.is_empty() {
    return Vec::new();
  }

  let line_cost = |i: usize| lines[i].len() + 1;
  let window = character::WINDOW_CHARS;
  let overlap = character::OVERLAP_CHARS;

  let mut chunks = Vec::new();
  let mut start = 0usize;

  while start < lines.len() {
    let mut end = start;
    let mut used = line_cost(start);
    while end + 1 < lines.len() && used + line_cost(end + 1) <= window {
      end += 1;
      used += line_cost(end);
    }

    let at_eof = end + 1 >= lines.len();

    if !at_eof {
      // A heading inside the window starts the next chunk; otherwise cut
      // at the last paragraph break.
      if let Some(heading) = (start + 1..=end).rev().find(|&i| is_heading(lines[i])) {
        end = heading - 1;
      } else if let Some(blank) = (start + 1..=end).rev().find(|&i| lines[i].trim().is_empty()) {
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

    let boundary_cut = is_heading(lines[end + 1]);
    let mut next = end + 1;
    if !boundary_cut {
      // Overlap only applies to arbitrary cuts; heading cuts are clean.
      let mut back = 0usize;
      while next > start + 1 && back < overlap {
        next -= 1;
        back += line_cost(next);
      }
    }
    start = next.max(start + 1);
  }

  chunks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_small_doc_single_chunk() {
    let chunks = chunk_docs("# README\n\nThis project does things.\n");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].start_line, 1);
    assert_eq!(chunks[0].end_line, 3);
  }

  #[test]
  fn test_heading_detection() {
    assert!(is_heading("# Title"));
    assert!(is_heading("### Deep section"));
    assert!(!is_heading("#hashtag"));
    assert!(!is_heading("plain text"));
  }

  #[test]
  fn test_splits_on_headings() {
    let section = |title: &str| format!("## {title}\n\n{}\n\n", "prose line with some words. ".repeat(8));
    let content = (0..20).map(|i| section(&format!("Section {i}"))).collect::<String>();

    let chunks = chunk_docs(&content);
    assert!(chunks.len() > 1);
    // Every chunk after a clean heading cut begins at a heading.
    for chunk in &chunks[1..] {
      let first = chunk.text.lines().next().unwrap();
      assert!(is_heading(first), "chunk should start at a heading, got: {first}");
    }
  }

  #[test]
  fn test_plain_prose_falls_back_to_paragraphs() {
    let para = format!("{}\n\n", "word ".repeat(120));
    let content = para.repeat(12);
    let chunks = chunk_docs(&content);
    assert!(chunks.len() > 1);
    for chunk in &chunks {
      assert!(!chunk.text.starts_with('\n'));
      assert!(!chunk.text.ends_with('\n'));
    }
  }
}
