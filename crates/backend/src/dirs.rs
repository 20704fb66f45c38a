//! Storage and cache directory resolution.
//!
//! All persisted state lives under a per-user storage root; embedding model
//! files cache under a separate user-home-scoped directory so they survive
//! index deletion.

use std::path::PathBuf;

/// Get the storage root for all per-project indexes.
///
/// Respects the following environment variables (in order of precedence):
/// 1. SEARCH_MCP_DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn storage_root() -> PathBuf {
  if let Ok(dir) = std::env::var("SEARCH_MCP_DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("search-mcp");
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("search-mcp")
}

/// Root directory holding one subdirectory per indexed project.
pub fn indexes_root() -> PathBuf {
  storage_root().join("indexes")
}

/// Cache directory for downloaded embedding model files.
///
/// Respects SEARCH_MCP_MODEL_CACHE, then falls back to a home-scoped cache.
pub fn model_cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("SEARCH_MCP_MODEL_CACHE") {
    return PathBuf::from(dir);
  }

  dirs::home_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(".cache")
    .join("search-mcp")
    .join("models")
}
