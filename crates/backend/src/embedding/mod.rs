//! Embedding engines.
//!
//! Two independently configured singletons share a common shape
//! `{model_name, dimension, batch_size, device}`: a 384-dim engine for
//! code and a 768-dim engine for docs. Initialization is idempotent and
//! serialized so concurrent first callers never download the same model
//! twice. All produced vectors are L2-normalized.

mod local;

use std::sync::Arc;

pub use local::LocalEngine;
use tokio::sync::OnceCell;

// ============================================================================
// Model Constants
// ============================================================================

pub const CODE_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const CODE_MODEL_DIM: usize = 384;
pub const DOCS_MODEL_NAME: &str = "BAAI/bge-base-en-v1.5";
pub const DOCS_MODEL_DIM: usize = 768;

const CPU_BATCH_SIZE: usize = 32;
const GPU_BATCH_SIZE: usize = 128;

// ============================================================================
// Engine Shape
// ============================================================================

/// Progress callback: `(done, total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
  Gpu,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub model_name: String,
  pub dimension: usize,
  pub batch_size: usize,
  pub device: Device,
}

impl EngineConfig {
  pub fn code() -> Self {
    Self {
      model_name: CODE_MODEL_NAME.to_string(),
      dimension: CODE_MODEL_DIM,
      batch_size: CPU_BATCH_SIZE,
      device: Device::Cpu,
    }
  }

  pub fn docs() -> Self {
    Self {
      model_name: DOCS_MODEL_NAME.to_string(),
      dimension: DOCS_MODEL_DIM,
      batch_size: CPU_BATCH_SIZE,
      device: Device::Cpu,
    }
  }

  /// Larger batches when a GPU device is selected.
  pub fn with_device(mut self, device: Device) -> Self {
    self.device = device;
    self.batch_size = match device {
      Device::Cpu => CPU_BATCH_SIZE,
      Device::Gpu => GPU_BATCH_SIZE,
    };
    self
  }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
  #[error("Model download failed: {0}")]
  DownloadFailed(String),
  #[error("Model initialization timed out")]
  InitTimeout,
  #[error("Embedding failed: {0}")]
  Runtime(String),
}

#[async_trait::async_trait]
pub trait EmbeddingEngine: Send + Sync {
  fn model_name(&self) -> &str;
  fn dimension(&self) -> usize;

  /// Embed a single text into a `dimension`-length L2-normalized vector.
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

  /// Embed many texts, batched, returning one vector per input in the
  /// same order. `on_progress` fires after each completed batch.
  async fn embed_batch(&self, texts: &[String], on_progress: Option<ProgressFn>) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Normalize a vector to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vector: &mut [f32]) {
  let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 0.0 {
    for x in vector.iter_mut() {
      *x /= norm;
    }
  }
}

// ============================================================================
// Singletons
// ============================================================================

static CODE_ENGINE: OnceCell<Arc<dyn EmbeddingEngine>> = OnceCell::const_new();
static DOCS_ENGINE: OnceCell<Arc<dyn EmbeddingEngine>> = OnceCell::const_new();

/// The process-wide code embedding engine (384-dim). First call loads the
/// model (downloading on first run); later calls are cheap.
pub async fn code_engine(on_progress: Option<ProgressFn>) -> Result<Arc<dyn EmbeddingEngine>, EmbeddingError> {
  CODE_ENGINE
    .get_or_try_init(|| async {
      let engine = LocalEngine::load(EngineConfig::code(), on_progress).await?;
      Ok(Arc::new(engine) as Arc<dyn EmbeddingEngine>)
    })
    .await
    .cloned()
}

/// The process-wide docs embedding engine (768-dim).
pub async fn docs_engine(on_progress: Option<ProgressFn>) -> Result<Arc<dyn EmbeddingEngine>, EmbeddingError> {
  DOCS_ENGINE
    .get_or_try_init(|| async {
      let engine = LocalEngine::load(EngineConfig::docs(), on_progress).await?;
      Ok(Arc::new(engine) as Arc<dyn EmbeddingEngine>)
    })
    .await
    .cloned()
}

// ============================================================================
// Deterministic Test Engine
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
  use super::*;

  /// Deterministic bag-of-tokens engine for tests: each lowercase token
  /// hashes to a dimension bucket, so texts sharing tokens have high
  /// cosine similarity without any model files.
  pub struct HashEngine {
    name: String,
    dimension: usize,
  }

  impl HashEngine {
    pub fn new(dimension: usize) -> Self {
      Self {
        name: format!("hash-engine-{dimension}"),
        dimension,
      }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
      use sha2::{Digest, Sha256};

      let mut vector = vec![0.0f32; self.dimension];
      for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
      {
        let digest = Sha256::digest(token.as_bytes());
        let bucket = u64::from_be_bytes(digest[..8].try_into().unwrap()) as usize % self.dimension;
        vector[bucket] += 1.0;
      }
      l2_normalize(&mut vector);
      vector
    }
  }

  #[async_trait::async_trait]
  impl EmbeddingEngine for HashEngine {
    fn model_name(&self) -> &str {
      &self.name
    }

    fn dimension(&self) -> usize {
      self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
      Ok(self.embed_sync(text))
    }

    async fn embed_batch(
      &self,
      texts: &[String],
      on_progress: Option<ProgressFn>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      let vectors = texts.iter().map(|t| self.embed_sync(t)).collect();
      if let Some(progress) = on_progress {
        progress(texts.len(), texts.len());
      }
      Ok(vectors)
    }
  }
}
