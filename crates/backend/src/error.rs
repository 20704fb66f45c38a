//! Tagged errors with dual user/developer messages.
//!
//! Every failure that crosses a tool or manager boundary carries a tag from
//! a closed set plus two messages: one safe to show to the user (no
//! absolute paths, no cause chains) and one for the log (absolute paths
//! allowed, sanitized of the user home prefix). Constructing a
//! [`SearchError`] emits an ERROR-level log record as a side effect, so
//! callers never have to remember to log before returning.

use std::fmt;

use tracing::error;

// ============================================================================
// Error Tags
// ============================================================================

/// Closed taxonomy of error tags surfaced through the tool interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTag {
  IndexNotFound,
  ModelDownloadFailed,
  IndexCorrupt,
  FileLimitWarning,
  PermissionDenied,
  DiskFull,
  FileNotFound,
  InvalidPattern,
  ProjectNotDetected,
  SymlinkNotAllowed,
  InvalidPath,
  ExtractionFailed,
}

impl ErrorTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorTag::IndexNotFound => "INDEX_NOT_FOUND",
      ErrorTag::ModelDownloadFailed => "MODEL_DOWNLOAD_FAILED",
      ErrorTag::IndexCorrupt => "INDEX_CORRUPT",
      ErrorTag::FileLimitWarning => "FILE_LIMIT_WARNING",
      ErrorTag::PermissionDenied => "PERMISSION_DENIED",
      ErrorTag::DiskFull => "DISK_FULL",
      ErrorTag::FileNotFound => "FILE_NOT_FOUND",
      ErrorTag::InvalidPattern => "INVALID_PATTERN",
      ErrorTag::ProjectNotDetected => "PROJECT_NOT_DETECTED",
      ErrorTag::SymlinkNotAllowed => "SYMLINK_NOT_ALLOWED",
      ErrorTag::InvalidPath => "INVALID_PATH",
      ErrorTag::ExtractionFailed => "EXTRACTION_FAILED",
    }
  }
}

impl fmt::Display for ErrorTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// SearchError
// ============================================================================

/// A tagged error with a user-facing and a developer-facing message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{user}")]
pub struct SearchError {
  tag: ErrorTag,
  user: String,
  dev: String,
}

impl SearchError {
  /// Construct a tagged error. Emits an ERROR log record.
  ///
  /// The developer message is sanitized: the user's home directory prefix
  /// is replaced with `~` before it reaches the log or the caller.
  pub fn new(tag: ErrorTag, user: impl Into<String>, dev: impl Into<String>) -> Self {
    let user = user.into();
    let dev = sanitize_home(&dev.into());
    error!(tag = tag.as_str(), detail = %dev, "{user}");
    Self { tag, user, dev }
  }

  pub fn tag(&self) -> ErrorTag {
    self.tag
  }

  /// Message safe to show to the user. Never contains absolute paths.
  pub fn user_message(&self) -> &str {
    &self.user
  }

  /// Message for logs and diagnostics. May contain sanitized paths.
  pub fn dev_message(&self) -> &str {
    &self.dev
  }

  /// Map an I/O error onto the taxonomy, keeping the path in the dev
  /// message only.
  pub fn from_io(err: &std::io::Error, user: impl Into<String>, path: &std::path::Path) -> Self {
    let tag = match err.kind() {
      std::io::ErrorKind::NotFound => ErrorTag::FileNotFound,
      std::io::ErrorKind::PermissionDenied => ErrorTag::PermissionDenied,
      std::io::ErrorKind::StorageFull => ErrorTag::DiskFull,
      _ => ErrorTag::ExtractionFailed,
    };
    Self::new(tag, user, format!("{}: {err}", path.display()))
  }
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl From<crate::store::StoreError> for SearchError {
  fn from(err: crate::store::StoreError) -> Self {
    use crate::store::StoreError;
    match &err {
      StoreError::Io(io) => {
        let io = std::io::Error::new(io.kind(), io.to_string());
        SearchError::from_io(&io, "Index storage operation failed", std::path::Path::new(""))
      }
      _ => SearchError::new(
        ErrorTag::IndexCorrupt,
        "The index store rejected an operation; reindex the project if this persists",
        err.to_string(),
      ),
    }
  }
}

impl From<crate::embedding::EmbeddingError> for SearchError {
  fn from(err: crate::embedding::EmbeddingError) -> Self {
    use crate::embedding::EmbeddingError;
    match &err {
      EmbeddingError::DownloadFailed(_) | EmbeddingError::InitTimeout => SearchError::new(
        ErrorTag::ModelDownloadFailed,
        "The embedding model could not be initialized; check network access and retry",
        err.to_string(),
      ),
      EmbeddingError::Runtime(_) => {
        SearchError::new(ErrorTag::ExtractionFailed, "Embedding failed", err.to_string())
      }
    }
  }
}

/// Replace the user's home directory prefix with `~`.
fn sanitize_home(message: &str) -> String {
  match dirs::home_dir() {
    Some(home) => {
      let home = home.to_string_lossy();
      message.replace(home.as_ref(), "~")
    }
    None => message.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tag_strings() {
    assert_eq!(ErrorTag::IndexNotFound.as_str(), "INDEX_NOT_FOUND");
    assert_eq!(ErrorTag::SymlinkNotAllowed.as_str(), "SYMLINK_NOT_ALLOWED");
    assert_eq!(ErrorTag::ModelDownloadFailed.as_str(), "MODEL_DOWNLOAD_FAILED");
  }

  #[test]
  fn test_user_message_is_display() {
    let err = SearchError::new(ErrorTag::IndexNotFound, "No index for this project", "missing /data/indexes/abc");
    assert_eq!(err.to_string(), "No index for this project");
    assert_eq!(err.tag(), ErrorTag::IndexNotFound);
  }

  #[test]
  fn test_dev_message_sanitizes_home() {
    if let Some(home) = dirs::home_dir() {
      let dev = format!("failed at {}/project/src", home.display());
      let err = SearchError::new(ErrorTag::ExtractionFailed, "read failed", dev);
      assert!(!err.dev_message().contains(&*home.to_string_lossy()));
      assert!(err.dev_message().starts_with("failed at ~"));
    }
  }

  #[test]
  fn test_from_io_maps_kinds() {
    let nf = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err = SearchError::from_io(&nf, "file missing", std::path::Path::new("/tmp/x"));
    assert_eq!(err.tag(), ErrorTag::FileNotFound);

    let pd = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    let err = SearchError::from_io(&pd, "cannot read", std::path::Path::new("/tmp/x"));
    assert_eq!(err.tag(), ErrorTag::PermissionDenied);
  }
}
