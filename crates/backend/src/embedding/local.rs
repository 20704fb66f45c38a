//! Local ONNX embedding engine backed by fastembed.
//!
//! Model files download on first use into the user-home-scoped cache from
//! `dirs::model_cache_dir()`. fastembed is synchronous (the ONNX runtime
//! parallelizes internally), so every call runs under `spawn_blocking`.

use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use tracing::{debug, info};

use super::{EmbeddingEngine, EmbeddingError, EngineConfig, ProgressFn, l2_normalize};
use crate::dirs;

/// Ceiling for model initialization, including a first-run download.
const INIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// A fastembed-backed engine for one model.
pub struct LocalEngine {
  config: EngineConfig,
  model: Arc<Mutex<TextEmbedding>>,
}

fn model_for(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
  match name {
    super::CODE_MODEL_NAME => Ok(EmbeddingModel::AllMiniLML6V2),
    super::DOCS_MODEL_NAME => Ok(EmbeddingModel::BGEBaseENV15),
    other => Err(EmbeddingError::Runtime(format!("unknown embedding model: {other}"))),
  }
}

impl LocalEngine {
  /// Load (or download) the model for a config. Safe to race: callers go
  /// through the module-level singletons, which serialize first use.
  pub async fn load(config: EngineConfig, on_progress: Option<ProgressFn>) -> Result<Self, EmbeddingError> {
    let model_kind = model_for(&config.model_name)?;
    let cache_dir = dirs::model_cache_dir();

    info!(model = %config.model_name, dimension = config.dimension, "Loading embedding model");
    if let Some(ref progress) = on_progress {
      progress(0, 1);
    }

    let options = TextInitOptions::new(model_kind)
      .with_cache_dir(cache_dir)
      .with_show_download_progress(false);

    let load = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options));
    let model = tokio::time::timeout(INIT_TIMEOUT, load)
      .await
      .map_err(|_| EmbeddingError::InitTimeout)?
      .map_err(|e| EmbeddingError::DownloadFailed(e.to_string()))?
      .map_err(|e| EmbeddingError::DownloadFailed(e.to_string()))?;

    if let Some(ref progress) = on_progress {
      progress(1, 1);
    }
    debug!(model = %config.model_name, "Embedding model ready");

    Ok(Self {
      config,
      model: Arc::new(Mutex::new(model)),
    })
  }

  async fn embed_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let model = self.model.clone();
    let batch_size = self.config.batch_size;
    let dimension = self.config.dimension;

    let vectors = tokio::task::spawn_blocking(move || {
      let mut model = model.lock().expect("embedding model poisoned");
      model.embed(texts, Some(batch_size))
    })
    .await
    .map_err(|e| EmbeddingError::Runtime(e.to_string()))?
    .map_err(|e| EmbeddingError::Runtime(e.to_string()))?;

    let mut out = Vec::with_capacity(vectors.len());
    for mut vector in vectors {
      if vector.len() != dimension {
        return Err(EmbeddingError::Runtime(format!(
          "model returned {} dims, expected {dimension}",
          vector.len()
        )));
      }
      l2_normalize(&mut vector);
      out.push(vector);
    }
    Ok(out)
  }
}

#[async_trait::async_trait]
impl EmbeddingEngine for LocalEngine {
  fn model_name(&self) -> &str {
    &self.config.model_name
  }

  fn dimension(&self) -> usize {
    self.config.dimension
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = self.embed_blocking(vec![text.to_string()]).await?;
    vectors.pop().ok_or_else(|| EmbeddingError::Runtime("empty embedding result".into()))
  }

  async fn embed_batch(&self, texts: &[String], on_progress: Option<ProgressFn>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let total = texts.len();
    let mut out = Vec::with_capacity(total);

    for batch in texts.chunks(self.config.batch_size.max(1)) {
      let vectors = self.embed_blocking(batch.to_vec()).await?;
      out.extend(vectors);
      if let Some(ref progress) = on_progress {
        progress(out.len(), total);
      }
    }

    Ok(out)
  }
}
