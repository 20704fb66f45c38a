//! Policy-driven file enumeration.
//!
//! Walks the project root honoring include/exclude globs and gitignore,
//! rejects symlinks and oversized files, and classifies each survivor as
//! code or docs. Binary sniffing happens at read time via
//! [`looks_binary`].

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::{
  domain::{ChunkKind, IndexConfig, project},
  error::{ErrorTag, Result, SearchError},
};

/// How many leading bytes are sniffed for NUL when rejecting binaries.
const BINARY_SNIFF_BYTES: usize = 8192;

// ============================================================================
// Policy
// ============================================================================

pub struct ScanPolicy {
  include: GlobSet,
  exclude: GlobSet,
  docs: GlobSet,
  respect_gitignore: bool,
  max_file_size: u64,
  max_files: usize,
  index_docs: bool,
}

impl ScanPolicy {
  pub fn from_config(config: &IndexConfig) -> Result<Self> {
    Ok(Self {
      include: build_globset(&config.include)?,
      exclude: build_globset(&config.exclude)?,
      docs: build_globset(&config.doc_patterns)?,
      respect_gitignore: config.respect_gitignore,
      max_file_size: config.max_file_size_bytes(),
      max_files: config.max_files,
      index_docs: config.index_docs,
    })
  }

  /// Classify a project-relative path, or None when policy excludes it.
  pub fn classify(&self, rel_path: &str) -> Option<ChunkKind> {
    if self.exclude.is_match(rel_path) {
      return None;
    }
    if self.docs.is_match(rel_path) {
      return self.index_docs.then_some(ChunkKind::Doc);
    }
    self.include.is_match(rel_path).then_some(ChunkKind::Code)
  }

  pub fn max_file_size(&self) -> u64 {
    self.max_file_size
  }
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let glob = Glob::new(pattern).map_err(|e| {
      SearchError::new(
        ErrorTag::InvalidPattern,
        format!("Invalid glob pattern: {pattern}"),
        e.to_string(),
      )
    })?;
    builder.add(glob);
  }
  builder.build().map_err(|e| {
    SearchError::new(ErrorTag::InvalidPattern, "Invalid glob pattern set", e.to_string())
  })
}

// ============================================================================
// Enumeration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScannedFile {
  pub rel_path: String,
  pub abs_path: PathBuf,
  pub kind: ChunkKind,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
  pub files: Vec<ScannedFile>,
  pub warning: Option<String>,
}

/// Enumerate indexable files under a project root.
pub fn enumerate(root: &Path, policy: &ScanPolicy) -> Result<ScanOutcome> {
  let walker = WalkBuilder::new(root)
    .follow_links(false)
    .git_ignore(policy.respect_gitignore)
    .git_global(policy.respect_gitignore)
    .git_exclude(policy.respect_gitignore)
    .require_git(false)
    .build();

  let mut files = Vec::new();
  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        warn!(error = %e, "Skipping unreadable entry during scan");
        continue;
      }
    };

    let path = entry.path();
    if path == root {
      continue;
    }

    if entry.path_is_symlink() {
      let rel = project::to_relative(root, path).unwrap_or_else(|| path.display().to_string());
      // Symlinks can point outside the project root, so they never index.
      let _ = SearchError::new(
        ErrorTag::SymlinkNotAllowed,
        format!("Skipped symlink: {rel}"),
        format!("symlink at {}", path.display()),
      );
      continue;
    }

    let Some(file_type) = entry.file_type() else { continue };
    if !file_type.is_file() {
      continue;
    }

    let Some(rel_path) = project::to_relative(root, path) else { continue };
    let Some(kind) = policy.classify(&rel_path) else { continue };

    if let Ok(metadata) = entry.metadata() {
      if metadata.len() > policy.max_file_size {
        debug!(path = %rel_path, size = metadata.len(), "Skipping oversized file");
        continue;
      }
    }

    files.push(ScannedFile {
      rel_path,
      abs_path: path.to_path_buf(),
      kind,
    });
  }

  files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

  let warning = if files.len() > policy.max_files {
    let message = format!(
      "Project has {} indexable files (soft limit {}); indexing may be slow",
      files.len(),
      policy.max_files
    );
    let _ = SearchError::new(ErrorTag::FileLimitWarning, message.clone(), message.clone());
    Some(message)
  } else {
    None
  };

  Ok(ScanOutcome { files, warning })
}

/// A file is treated as binary when its leading bytes contain NUL.
pub fn looks_binary(bytes: &[u8]) -> bool {
  bytes.iter().take(BINARY_SNIFF_BYTES).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy() -> ScanPolicy {
    ScanPolicy::from_config(&IndexConfig::default()).unwrap()
  }

  fn touch(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  #[test]
  fn test_classify() {
    let policy = policy();
    assert_eq!(policy.classify("src/main.rs"), Some(ChunkKind::Code));
    assert_eq!(policy.classify("auth/login.ts"), Some(ChunkKind::Code));
    assert_eq!(policy.classify("docs/README.md"), Some(ChunkKind::Doc));
    assert_eq!(policy.classify("notes.txt"), Some(ChunkKind::Doc));
    assert_eq!(policy.classify("node_modules/pkg/index.js"), None);
    assert_eq!(policy.classify("image.png"), None);
  }

  #[test]
  fn test_docs_disabled() {
    let mut config = IndexConfig::default();
    config.index_docs = false;
    let policy = ScanPolicy::from_config(&config).unwrap();
    assert_eq!(policy.classify("README.md"), None);
    assert_eq!(policy.classify("src/main.rs"), Some(ChunkKind::Code));
  }

  #[test]
  fn test_invalid_glob_is_tagged() {
    let mut config = IndexConfig::default();
    config.include = vec!["src/{broken".to_string()];
    let err = ScanPolicy::from_config(&config).unwrap_err();
    assert_eq!(err.tag(), ErrorTag::InvalidPattern);
  }

  #[test]
  fn test_enumerate_classifies_and_sorts() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(&dir.path().join("auth/login.ts"), "export function login() {}");
    touch(&dir.path().join("db/query.ts"), "export function query() {}");
    touch(&dir.path().join("docs/README.md"), "# Readme");
    touch(&dir.path().join("image.bin"), "binary");

    let outcome = enumerate(dir.path(), &policy()).unwrap();
    let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(rels, vec!["auth/login.ts", "db/query.ts", "docs/README.md"]);
    assert_eq!(outcome.files[2].kind, ChunkKind::Doc);
    assert!(outcome.warning.is_none());
  }

  #[test]
  fn test_enumerate_respects_gitignore() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(&dir.path().join(".gitignore"), "generated/\n");
    touch(&dir.path().join("src/app.ts"), "let a = 1;");
    touch(&dir.path().join("generated/out.ts"), "let b = 2;");

    let outcome = enumerate(dir.path(), &policy()).unwrap();
    let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(rels, vec!["src/app.ts"]);

    let mut config = IndexConfig::default();
    config.respect_gitignore = false;
    let loose = ScanPolicy::from_config(&config).unwrap();
    let outcome = enumerate(dir.path(), &loose).unwrap();
    assert_eq!(outcome.files.len(), 2);
  }

  #[test]
  fn test_enumerate_skips_oversized() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = IndexConfig::default();
    config.max_file_size = "1KB".to_string();
    touch(&dir.path().join("small.ts"), "let a = 1;");
    touch(&dir.path().join("big.ts"), &"x".repeat(4096));

    let outcome = enumerate(dir.path(), &ScanPolicy::from_config(&config).unwrap()).unwrap();
    let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(rels, vec!["small.ts"]);
  }

  #[cfg(unix)]
  #[test]
  fn test_enumerate_rejects_symlinks() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(&dir.path().join("real.ts"), "let a = 1;");
    std::os::unix::fs::symlink(dir.path().join("real.ts"), dir.path().join("link.ts")).unwrap();

    let outcome = enumerate(dir.path(), &policy()).unwrap();
    let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(rels, vec!["real.ts"]);
  }

  #[test]
  fn test_file_limit_warning() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..5 {
      touch(&dir.path().join(format!("f{i}.ts")), "let x = 1;");
    }
    let mut config = IndexConfig::default();
    config.max_files = 3;

    let outcome = enumerate(dir.path(), &ScanPolicy::from_config(&config).unwrap()).unwrap();
    assert_eq!(outcome.files.len(), 5, "the limit is soft; nothing is dropped");
    assert!(outcome.warning.is_some());
  }

  #[test]
  fn test_looks_binary() {
    assert!(looks_binary(b"\x7fELF\x00\x01"));
    assert!(!looks_binary(b"plain text with unicode \xc3\xa9"));
  }
}
