//! The per-index configuration document (`config.json`).
//!
//! User-owned: the index manager reads it on startup and the tools write
//! it only when creating a fresh index. Typed fields are strict; unknown
//! fields are preserved across load/save so newer configs survive older
//! binaries.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorTag, Result, SearchError};

pub const CONFIG_FILE: &str = "config.json";

/// Soft ceiling on enumerated files before a non-fatal warning.
pub const DEFAULT_MAX_FILES: usize = 50_000;

// ============================================================================
// Chunking Strategy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
  Character,
  CodeAware,
}

/// Configs written before the strategy field existed chunked by character.
fn strategy_compat_default() -> ChunkingStrategy {
  ChunkingStrategy::Character
}

// ============================================================================
// Hybrid Search
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtsEngineChoice {
  Auto,
  Js,
  Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HybridSearchConfig {
  pub fts_engine: FtsEngineChoice,
  pub default_alpha: f32,
}

impl Default for HybridSearchConfig {
  fn default() -> Self {
    Self {
      fts_engine: FtsEngineChoice::Auto,
      default_alpha: 0.7,
    }
  }
}

// ============================================================================
// Config Document
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexConfig {
  /// Globs selecting indexable source files.
  pub include: Vec<String>,
  /// Globs excluding VCS and build artifacts.
  pub exclude: Vec<String>,
  pub respect_gitignore: bool,
  /// Human-readable size cap, e.g. "1MB".
  pub max_file_size: String,
  pub max_files: usize,
  pub doc_patterns: Vec<String>,
  pub index_docs: bool,
  #[serde(default = "strategy_compat_default")]
  pub chunking_strategy: ChunkingStrategy,
  pub hybrid_search: HybridSearchConfig,
  pub enhanced_tool_descriptions: bool,
  /// Unknown fields, preserved verbatim across load/save.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      include: default_include(),
      exclude: default_exclude(),
      respect_gitignore: true,
      max_file_size: "1MB".to_string(),
      max_files: DEFAULT_MAX_FILES,
      doc_patterns: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
      index_docs: true,
      // New indexes chunk code-aware; files that predate the field keep
      // character chunking via the serde field default.
      chunking_strategy: ChunkingStrategy::CodeAware,
      hybrid_search: HybridSearchConfig::default(),
      enhanced_tool_descriptions: false,
      extra: serde_json::Map::new(),
    }
  }
}

fn default_include() -> Vec<String> {
  [
    "**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx", "**/*.mjs", "**/*.cjs", "**/*.py", "**/*.rs", "**/*.go",
    "**/*.java", "**/*.c", "**/*.h", "**/*.cpp", "**/*.hpp", "**/*.cc", "**/*.cs", "**/*.rb", "**/*.php",
    "**/*.swift", "**/*.kt", "**/*.scala", "**/*.sh", "**/*.sql", "**/*.json", "**/*.yaml", "**/*.yml", "**/*.toml",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

fn default_exclude() -> Vec<String> {
  [
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/*.min.js",
    "**/*.lock",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

impl IndexConfig {
  /// Load the config document from an index directory. A missing file
  /// yields fresh-index defaults; a corrupted file is an error.
  pub fn load(index_dir: &Path) -> Result<Self> {
    let path = index_dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
      Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
        SearchError::new(
          ErrorTag::IndexCorrupt,
          "Index configuration is corrupted; delete and recreate the index",
          format!("{}: {e}", path.display()),
        )
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
      Err(e) => Err(SearchError::from_io(&e, "Could not read index configuration", &path)),
    }
  }

  /// Persist the config with a write-to-temp-then-rename so readers never
  /// observe a torn file.
  pub fn save(&self, index_dir: &Path) -> Result<()> {
    let path = index_dir.join(CONFIG_FILE);
    write_document(&path, self)
  }

  /// `max_file_size` parsed to bytes.
  pub fn max_file_size_bytes(&self) -> u64 {
    parse_size(&self.max_file_size).unwrap_or(1024 * 1024)
  }
}

/// Serialize a document to pretty JSON and atomically replace the target.
pub fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| SearchError::from_io(&e, "Could not create the index directory", parent))?;
  }
  let json = serde_json::to_string_pretty(value).map_err(|e| {
    SearchError::new(ErrorTag::ExtractionFailed, "Could not serialize an index document", e.to_string())
  })?;
  let tmp = path.with_extension("json.tmp");
  std::fs::write(&tmp, json).map_err(|e| SearchError::from_io(&e, "Could not write an index document", &tmp))?;
  std::fs::rename(&tmp, path).map_err(|e| SearchError::from_io(&e, "Could not write an index document", path))?;
  Ok(())
}

/// Parse "512", "64KB", "1MB", "2GB" into bytes.
pub fn parse_size(input: &str) -> Option<u64> {
  let trimmed = input.trim();
  let upper = trimmed.to_ascii_uppercase();
  let (digits, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
    (n, 1024 * 1024 * 1024)
  } else if let Some(n) = upper.strip_suffix("MB") {
    (n, 1024 * 1024)
  } else if let Some(n) = upper.strip_suffix("KB") {
    (n, 1024)
  } else if let Some(n) = upper.strip_suffix("B") {
    (n, 1)
  } else {
    (upper.as_str(), 1)
  };
  digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}
