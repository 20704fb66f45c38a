//! Code-aware chunker.
//!
//! Heuristic, regex-driven detection of structural boundaries: top-level
//! function/class/interface/type/enum declarations and `export`s for
//! curly-brace languages, `def`/`async def`/`class` with preceding
//! decorator lines for Python. Declarations merge until a chunk reaches
//! the target size; oversized declarations split on a secondary boundary
//! with a reduced (~5%) overlap. Unrecognized languages fall back to the
//! character chunker.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{TextChunk, character, make_chunk};

/// Merge adjacent declarations until a chunk reaches this size.
const TARGET_CHARS: usize = 3200;
/// Declarations larger than this split on a secondary boundary.
const MAX_CHARS: usize = 6000;
/// Overlap used when splitting oversized declarations (~5% of the
/// character window).
const CODE_OVERLAP_CHARS: usize = character::WINDOW_CHARS / 20;

// ============================================================================
// Language Rules
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryRules {
  Curly,
  Python,
  Unknown,
}

fn rules_for_extension(ext: &str) -> BoundaryRules {
  match ext {
    "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "go" | "java" | "c" | "h" | "cpp" | "hpp" | "cc" | "cs" | "rs"
    | "swift" | "kt" | "scala" | "php" => BoundaryRules::Curly,
    "py" => BoundaryRules::Python,
    _ => BoundaryRules::Unknown,
  }
}

static ARROW_FN_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(export\s+)?(const|let|var)\s+\w+\s*=\s*(async\s*)?\(").expect("invalid regex"));

static DECORATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@\w").expect("invalid regex"));

const CURLY_PREFIXES: &[&str] = &[
  "function ",
  "async function ",
  "class ",
  "interface ",
  "enum ",
  "type ",
  "export ",
  "fn ",
  "pub ",
  "impl ",
  "trait ",
  "struct ",
  "mod ",
  "func ",
  "def ",
  "public ",
  "private ",
  "protected ",
  "static ",
  "namespace ",
];

/// A top-level declaration starts at column zero with a recognized
/// declaration prefix (or an arrow-function assignment).
fn is_boundary_line(line: &str, rules: BoundaryRules) -> bool {
  if line.is_empty() || line.starts_with(char::is_whitespace) {
    return false;
  }
  match rules {
    BoundaryRules::Curly => CURLY_PREFIXES.iter().any(|p| line.starts_with(p)) || ARROW_FN_RE.is_match(line),
    BoundaryRules::Python => {
      line.starts_with("def ") || line.starts_with("async def ") || line.starts_with("class ")
    }
    BoundaryRules::Unknown => false,
  }
}

// ============================================================================
// Chunker
// ============================================================================

/// Chunk source code by declaration boundaries, falling back to the
/// character chunker when the language is unrecognized or no boundary is
/// found.
pub fn chunk_code(content: &str, ext: &str) -> Vec<TextChunk> {
  let rules = rules_for_extension(&ext.to_lowercase());
  if rules == BoundaryRules::Unknown {
    return character::chunk_characters(content);
  }

  let lines: Vec<&str> = content.lines().collect();
  let mut boundaries: Vec<usize> = lines
    .iter()
    .enumerate()
    .filter(|(_, line)| is_boundary_line(line, rules))
    .map(|(i, _)| i)
    .collect();

  if boundaries.is_empty() {
    return character::chunk_characters(content);
  }

  // Never split between a decorator and the decorated definition: pull
  // each boundary up over any immediately preceding decorator lines.
  for boundary in boundaries.iter_mut() {
    while *boundary > 0 && DECORATOR_RE.is_match(lines[*boundary - 1].trim_start()) {
      *boundary -= 1;
    }
  }
  boundaries.dedup();

  // Declaration segments as 0-based inclusive line ranges, including any
  // preamble before the first declaration.
  let mut segments: Vec<(usize, usize)> = Vec::new();
  if boundaries[0] > 0 {
    segments.push((0, boundaries[0] - 1));
  }
  for (i, &start) in boundaries.iter().enumerate() {
    let end = boundaries.get(i + 1).map(|&next| next - 1).unwrap_or(lines.len() - 1);
    if start <= end {
      segments.push((start, end));
    }
  }

  let segment_chars = |(start, end): (usize, usize)| -> usize {
    lines[start..=end].iter().map(|l| l.len() + 1).sum()
  };

  // Merge adjacent small declarations up to the target size.
  let mut merged: Vec<(usize, usize)> = Vec::new();
  for segment in segments {
    match merged.last_mut() {
      Some(last) if segment_chars(*last) + segment_chars(segment) <= TARGET_CHARS => {
        last.1 = segment.1;
      }
      _ => merged.push(segment),
    }
  }

  let mut chunks = Vec::new();
  for (start, end) in merged {
    if segment_chars((start, end)) > MAX_CHARS {
      // Oversized declaration: split on a secondary boundary with the
      // reduced code-aware overlap, re-anchoring line numbers.
      let span = lines[start..=end].join("\n");
      for sub in character::chunk_window(&span, character::WINDOW_CHARS, CODE_OVERLAP_CHARS) {
        chunks.push(TextChunk {
          start_line: sub.start_line + start as u32,
          end_line: sub.end_line + start as u32,
          text: sub.text,
        });
      }
    } else if let Some(chunk) = make_chunk(&lines, start, end) {
      chunks.push(chunk);
    }
  }

  if chunks.is_empty() {
    return character::chunk_characters(content);
  }
  chunks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_extension_falls_back() {
    let content = "some content\nwith lines\n";
    assert_eq!(chunk_code(content, "xyz"), character::chunk_characters(content));
  }

  #[test]
  fn test_small_declarations_merge() {
    let content = "fn a() {}\n\nfn b() {}\n\nfn c() {}\n";
    let chunks = chunk_code(content, "rs");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].start_line, 1);
    assert_eq!(chunks[0].end_line, 5);
  }

  #[test]
  fn test_large_declarations_stay_separate() {
    let body = "    let x = 1;\n".repeat(250);
    let content = format!("fn first() {{\n{body}}}\n\nfn second() {{\n{body}}}\n");
    let chunks = chunk_code(&content, "rs");
    assert!(chunks.len() >= 2);

    // No chunk mixes the two functions.
    for chunk in &chunks {
      assert!(!(chunk.text.contains("fn first") && chunk.text.contains("fn second")));
    }
  }

  #[test]
  fn test_python_decorator_stays_with_definition() {
    let filler = "x = 1\n".repeat(600);
    let content = format!("{filler}@app.route('/login')\ndef login():\n    return render()\n");
    let chunks = chunk_code(&content, "py");

    let decorated = chunks.iter().find(|c| c.text.contains("def login")).expect("login chunk");
    assert!(
      decorated.text.contains("@app.route"),
      "decorator must not be split from its definition"
    );
  }

  #[test]
  fn test_typescript_exports_and_arrows_are_boundaries() {
    assert!(is_boundary_line("export function login() {", BoundaryRules::Curly));
    assert!(is_boundary_line("export class Session {", BoundaryRules::Curly));
    assert!(is_boundary_line("const handler = async (req) => {", BoundaryRules::Curly));
    assert!(is_boundary_line("interface User {", BoundaryRules::Curly));
    assert!(!is_boundary_line("  const inner = 1;", BoundaryRules::Curly));
    assert!(!is_boundary_line("return value;", BoundaryRules::Curly));
  }

  #[test]
  fn test_indented_python_defs_are_not_top_level() {
    assert!(is_boundary_line("def top():", BoundaryRules::Python));
    assert!(is_boundary_line("async def fetch():", BoundaryRules::Python));
    assert!(!is_boundary_line("    def method(self):", BoundaryRules::Python));
  }

  #[test]
  fn test_oversized_declaration_splits() {
    let body = "    let value = compute();\n".repeat(400);
    let content = format!("fn huge() {{\n{body}}}\n");
    let chunks = chunk_code(&content, "rs");
    assert!(chunks.len() > 1);

    let line_count = content.lines().count() as u32;
    for chunk in &chunks {
      assert!(chunk.end_line <= line_count);
      assert!(chunk.start_line >= 1);
    }
  }

  #[test]
  fn test_no_boundaries_falls_back() {
    let content = "  indented = true\n  more = data\n";
    assert_eq!(chunk_code(content, "rs"), character::chunk_characters(content));
  }
}
