//! The chunk record: the atomic unit of retrieval.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a chunk came from source code or prose documentation. The kind
/// selects the chunker, the embedding engine, and the target stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
  Code,
  Doc,
}

impl ChunkKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ChunkKind::Code => "code",
      ChunkKind::Doc => "doc",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "code" => Some(ChunkKind::Code),
      "doc" => Some(ChunkKind::Doc),
      _ => None,
    }
  }
}

/// A contiguous text span with line coordinates.
///
/// `start_line` and `end_line` are 1-based inclusive line numbers in the
/// original source file. Leading and trailing blank lines are trimmed
/// before storage; the line numbers always refer to the trimmed span's
/// position in the untrimmed source.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
  pub id: Uuid,
  /// Project-relative, forward-slash separated.
  pub path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub text: String,
  /// Content hash of the source file at index time.
  pub fingerprint: String,
  pub kind: ChunkKind,
}

impl Chunk {
  pub fn new(path: &str, start_line: u32, end_line: u32, text: String, fingerprint: &str, kind: ChunkKind) -> Self {
    Self {
      id: Uuid::new_v4(),
      path: path.to_string(),
      start_line,
      end_line,
      text,
      fingerprint: fingerprint.to_string(),
      kind,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_round_trip() {
    assert_eq!(ChunkKind::parse("code"), Some(ChunkKind::Code));
    assert_eq!(ChunkKind::parse("doc"), Some(ChunkKind::Doc));
    assert_eq!(ChunkKind::parse("other"), None);
    assert_eq!(ChunkKind::Code.as_str(), "code");
  }

  #[test]
  fn test_new_assigns_unique_ids() {
    let a = Chunk::new("src/a.rs", 1, 3, "fn a() {}".into(), "abc", ChunkKind::Code);
    let b = Chunk::new("src/a.rs", 1, 3, "fn a() {}".into(), "abc", ChunkKind::Code);
    assert_ne!(a.id, b.id);
  }
}
