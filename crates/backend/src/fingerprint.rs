//! Content-fingerprint maps for delta detection.
//!
//! Two independent maps (code and docs) from project-relative path to a
//! content hash, produced at index time and consulted on every incremental
//! update. Persisted as flat JSON objects next to the index so the maps
//! are inspectable and diff-friendly.

use std::{collections::BTreeMap, path::{Path, PathBuf}};

use sha2::{Digest, Sha256};

use crate::{
  domain::{ChunkKind, config::write_document},
  error::{ErrorTag, Result, SearchError},
};

pub const CODE_FINGERPRINTS_FILE: &str = "fingerprints.json";
pub const DOCS_FINGERPRINTS_FILE: &str = "docs-fingerprints.json";

/// Content hash of a source file (SHA-256, truncated to 16 hex chars).
pub fn fingerprint_of(content: &[u8]) -> String {
  let digest = Sha256::digest(content);
  hex::encode(&digest[..8])
}

/// A persisted path -> content-hash map.
#[derive(Debug)]
pub struct FingerprintMap {
  path: PathBuf,
  entries: BTreeMap<String, String>,
}

impl FingerprintMap {
  fn file_name(kind: ChunkKind) -> &'static str {
    match kind {
      ChunkKind::Code => CODE_FINGERPRINTS_FILE,
      ChunkKind::Doc => DOCS_FINGERPRINTS_FILE,
    }
  }

  /// Load the map for a kind from an index directory; missing files start
  /// empty.
  pub fn load(index_dir: &Path, kind: ChunkKind) -> Result<Self> {
    let path = index_dir.join(Self::file_name(kind));
    let entries = match std::fs::read_to_string(&path) {
      Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
        SearchError::new(
          ErrorTag::IndexCorrupt,
          "Fingerprint store is corrupted; reindex the project",
          format!("{}: {e}", path.display()),
        )
      })?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(SearchError::from_io(&e, "Could not read fingerprint store", &path)),
    };
    Ok(Self { path, entries })
  }

  pub fn get(&self, rel_path: &str) -> Option<&str> {
    self.entries.get(rel_path).map(String::as_str)
  }

  pub fn insert(&mut self, rel_path: &str, hash: &str) {
    self.entries.insert(rel_path.to_string(), hash.to_string());
  }

  pub fn remove(&mut self, rel_path: &str) -> bool {
    self.entries.remove(rel_path).is_some()
  }

  pub fn contains(&self, rel_path: &str) -> bool {
    self.entries.contains_key(rel_path)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  /// Persist atomically (write-to-temp-then-rename).
  pub fn save(&self) -> Result<()> {
    write_document(&self.path, &self.entries)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fingerprint_is_stable_and_content_sensitive() {
    let a = fingerprint_of(b"fn main() {}");
    let b = fingerprint_of(b"fn main() {}");
    let c = fingerprint_of(b"fn main() { }");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 16);
  }

  #[test]
  fn test_load_missing_starts_empty() {
    let dir = tempfile::TempDir::new().unwrap();
    let map = FingerprintMap::load(dir.path(), ChunkKind::Code).unwrap();
    assert!(map.is_empty());
  }

  #[test]
  fn test_save_load_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut map = FingerprintMap::load(dir.path(), ChunkKind::Code).unwrap();
    map.insert("src/a.rs", "aaaa");
    map.insert("src/b.rs", "bbbb");
    map.save().unwrap();

    let reloaded = FingerprintMap::load(dir.path(), ChunkKind::Code).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.get("src/a.rs"), Some("aaaa"));
    assert!(reloaded.contains("src/b.rs"));
  }

  #[test]
  fn test_code_and_docs_maps_are_independent() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut code = FingerprintMap::load(dir.path(), ChunkKind::Code).unwrap();
    code.insert("src/a.rs", "aaaa");
    code.save().unwrap();

    let docs = FingerprintMap::load(dir.path(), ChunkKind::Doc).unwrap();
    assert!(docs.is_empty());
    assert!(dir.path().join(CODE_FINGERPRINTS_FILE).exists());
    assert!(!dir.path().join(DOCS_FINGERPRINTS_FILE).exists());
  }

  #[test]
  fn test_remove() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut map = FingerprintMap::load(dir.path(), ChunkKind::Doc).unwrap();
    map.insert("README.md", "cafe");
    assert!(map.remove("README.md"));
    assert!(!map.remove("README.md"));
    assert!(map.get("README.md").is_none());
  }
}
