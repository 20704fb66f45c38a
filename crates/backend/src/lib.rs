mod chunking;
mod fingerprint;
mod manager;
mod search;
mod store;
mod watcher;

mod domain;
pub use domain::{Chunk, ChunkKind, ChunkingStrategy, IndexConfig, IndexMetadata, ModelIdentity, ProjectId, config, metadata, project};

pub mod dirs;
pub mod embedding;
pub mod error;
pub mod logging;

mod server;
mod tools;
pub use manager::{IndexReport, ProjectIndex, StatusReport};
pub use search::{CompactResponse, SearchMode, SearchRequest, SearchResponse};
pub use server::run_stdio;
pub use tools::ToolHandler;
pub use watcher::{DEBOUNCE, FileWatcher, WatcherHandle};

/// Serializes tests that rewire process-wide environment variables.
#[cfg(test)]
pub(crate) mod testenv {
  use std::sync::{Mutex, MutexGuard};

  static ENV_LOCK: Mutex<()> = Mutex::new(());

  pub fn lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}
