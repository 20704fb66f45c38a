//! The index metadata document (`metadata.json`).
//!
//! Written only by the index manager. Records counts, timestamps, storage
//! size, and the embedding-model identity that makes migrations safe: a
//! mismatch against the current runtime constants blocks search and warns
//! in status.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  domain::config::write_document,
  embedding::{CODE_MODEL_DIM, CODE_MODEL_NAME, DOCS_MODEL_DIM, DOCS_MODEL_NAME},
  error::{ErrorTag, Result, SearchError},
};

pub const METADATA_FILE: &str = "metadata.json";

/// On-disk format version for the index directory layout.
pub const INDEX_VERSION: u32 = 2;

// ============================================================================
// Model Identity
// ============================================================================

/// The `(name, dimension)` pairs recorded at index time, used to detect
/// embedding-model migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIdentity {
  pub code_model_name: String,
  pub code_model_dimension: usize,
  pub docs_model_name: String,
  pub docs_model_dimension: usize,
}

impl ModelIdentity {
  /// The identity of the engines compiled into this binary.
  pub fn runtime() -> Self {
    Self {
      code_model_name: CODE_MODEL_NAME.to_string(),
      code_model_dimension: CODE_MODEL_DIM,
      docs_model_name: DOCS_MODEL_NAME.to_string(),
      docs_model_dimension: DOCS_MODEL_DIM,
    }
  }
}

// ============================================================================
// Metadata Document
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexMetadata {
  pub version: u32,
  pub last_code_index: Option<DateTime<Utc>>,
  pub last_docs_index: Option<DateTime<Utc>>,
  pub total_chunks: usize,
  pub total_doc_chunks: usize,
  pub storage_bytes: u64,
  #[serde(flatten)]
  pub models: ModelIdentity,
  /// Unknown fields, preserved verbatim across load/save.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for IndexMetadata {
  fn default() -> Self {
    Self {
      version: INDEX_VERSION,
      last_code_index: None,
      last_docs_index: None,
      total_chunks: 0,
      total_doc_chunks: 0,
      storage_bytes: 0,
      models: ModelIdentity::runtime(),
      extra: serde_json::Map::new(),
    }
  }
}

impl IndexMetadata {
  pub fn load(index_dir: &Path) -> Result<Self> {
    let path = index_dir.join(METADATA_FILE);
    match std::fs::read_to_string(&path) {
      Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
        SearchError::new(
          ErrorTag::IndexCorrupt,
          "Index metadata is corrupted; reindex the project",
          format!("{}: {e}", path.display()),
        )
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SearchError::new(
        ErrorTag::IndexNotFound,
        "No index exists for this project; run create_index first",
        format!("missing {}", path.display()),
      )),
      Err(e) => Err(SearchError::from_io(&e, "Could not read index metadata", &path)),
    }
  }

  /// True when a metadata document exists for the index directory.
  pub fn exists(index_dir: &Path) -> bool {
    index_dir.join(METADATA_FILE).exists()
  }

  pub fn save(&self, index_dir: &Path) -> Result<()> {
    write_document(&index_dir.join(METADATA_FILE), self)
  }

  /// Human-readable warning when the stored model identity differs from
  /// the current runtime constants. None when compatible.
  pub fn compatibility_warning(&self) -> Option<String> {
    let runtime = ModelIdentity::runtime();
    if self.models == runtime {
      return None;
    }
    Some(format!(
      "Index was built with {} ({}d) / {} ({}d) but this version uses {} ({}d) / {} ({}d). Reindex the project to migrate.",
      self.models.code_model_name,
      self.models.code_model_dimension,
      self.models.docs_model_name,
      self.models.docs_model_dimension,
      runtime.code_model_name,
      runtime.code_model_dimension,
      runtime.docs_model_name,
      runtime.docs_model_dimension,
    ))
  }

  /// Blocking variant used by search paths: a mismatch is an error whose
  /// message names both identities and instructs the user to reindex.
  pub fn ensure_compatible(&self) -> Result<()> {
    match self.compatibility_warning() {
      None => Ok(()),
      Some(warning) => Err(SearchError::new(
        ErrorTag::IndexCorrupt,
        warning.clone(),
        format!("model identity mismatch: {warning}"),
      )),
    }
  }
}
