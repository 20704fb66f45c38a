//! Project identity and path safety.
//!
//! A project is identified by its canonical absolute path. A stable hex
//! digest of that path names the per-project index directory under the
//! storage root, so the same project always resolves to the same index no
//! matter where the process is launched from.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  dirs,
  error::{ErrorTag, Result, SearchError},
};

// ============================================================================
// Path Safety
// ============================================================================

/// Reject relative inputs that would escape a project root.
///
/// Absolute paths and any path containing a `..` component are treated as
/// traversal attempts.
pub fn is_path_traversal(rel: &str) -> bool {
  let path = Path::new(rel);
  if path.is_absolute() {
    return true;
  }
  path.components().any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
}

/// Join a project-relative path onto a base directory, rejecting traversal.
pub fn safe_join(base: &Path, rel: &str) -> Result<PathBuf> {
  if is_path_traversal(rel) {
    return Err(SearchError::new(
      ErrorTag::InvalidPath,
      "Path is outside the project",
      format!("refusing to join {rel:?} onto {}", base.display()),
    ));
  }
  Ok(base.join(rel))
}

/// Convert an absolute path inside the project to its project-relative,
/// forward-slash form. Returns None for paths outside the root.
pub fn to_relative(root: &Path, abs: &Path) -> Option<String> {
  let rel = abs.strip_prefix(root).ok()?;
  let mut out = String::new();
  for component in rel.components() {
    if !out.is_empty() {
      out.push('/');
    }
    out.push_str(&component.as_os_str().to_string_lossy());
  }
  if out.is_empty() { None } else { Some(out) }
}

// ============================================================================
// Project Identity
// ============================================================================

/// Stable identifier for a project, derived from its canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
  /// Create a ProjectId from a path. The path is canonicalized first so
  /// `.`/`..` spellings and symlinked launch directories converge on the
  /// same identity.
  pub fn from_path(path: &Path) -> Self {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    ProjectId(stable_hash(&canonical))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The per-project index directory: `<storage_root>/indexes/<H>/`.
  pub fn index_dir(&self) -> PathBuf {
    dirs::indexes_root().join(&self.0)
  }
}

impl std::fmt::Display for ProjectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Stable hex digest of a path (SHA-256, truncated to 16 hex chars).
fn stable_hash(path: &Path) -> String {
  let digest = Sha256::digest(path.to_string_lossy().as_bytes());
  hex::encode(&digest[..8])
}

// ============================================================================
// Project Detection
// ============================================================================

/// Find the project root for a directory by walking upward for a `.git`
/// marker. Falls back to the directory itself when no marker is found.
pub fn detect_project_root(start: &Path) -> Result<PathBuf> {
  let canonical = start.canonicalize().map_err(|e| {
    SearchError::new(
      ErrorTag::ProjectNotDetected,
      "Could not detect a project at the current location",
      format!("{}: {e}", start.display()),
    )
  })?;

  if !canonical.is_dir() {
    return Err(SearchError::new(
      ErrorTag::ProjectNotDetected,
      "Project path is not a directory",
      format!("{}", canonical.display()),
    ));
  }

  let mut current = canonical.clone();
  loop {
    if current.join(".git").exists() {
      return Ok(current);
    }
    if !current.pop() {
      return Ok(canonical);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_traversal_rejects_parent_and_absolute() {
    assert!(is_path_traversal("../etc/passwd"));
    assert!(is_path_traversal("src/../../escape"));
    assert!(is_path_traversal("/etc/passwd"));
    assert!(!is_path_traversal("src/main.rs"));
    assert!(!is_path_traversal("a/b/c.txt"));
  }

  #[test]
  fn test_safe_join() {
    let base = Path::new("/project");
    assert_eq!(safe_join(base, "src/lib.rs").unwrap(), PathBuf::from("/project/src/lib.rs"));
    assert!(safe_join(base, "../outside").is_err());
    assert!(safe_join(base, "/abs/path").is_err());
  }

  #[test]
  fn test_to_relative_forward_slashes() {
    let root = Path::new("/project");
    let abs = Path::new("/project/src/auth/login.ts");
    assert_eq!(to_relative(root, abs).as_deref(), Some("src/auth/login.ts"));
    assert_eq!(to_relative(root, Path::new("/elsewhere/x")), None);
  }

  #[test]
  fn test_project_id_stable() {
    let a = ProjectId::from_path(Path::new("/some/project"));
    let b = ProjectId::from_path(Path::new("/some/project"));
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 16);
    assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_distinct_projects_distinct_ids() {
    let a = ProjectId::from_path(Path::new("/some/project"));
    let b = ProjectId::from_path(Path::new("/some/other"));
    assert_ne!(a, b);
  }

  #[test]
  fn test_detect_project_root_finds_git() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("repo");
    std::fs::create_dir_all(root.join(".git")).unwrap();
    std::fs::create_dir_all(root.join("src/nested")).unwrap();

    let detected = detect_project_root(&root.join("src/nested")).unwrap();
    assert_eq!(detected, root.canonicalize().unwrap());
  }

  #[test]
  fn test_detect_project_root_missing_path() {
    let err = detect_project_root(Path::new("/definitely/not/here")).unwrap_err();
    assert_eq!(err.tag(), ErrorTag::ProjectNotDetected);
  }
}
