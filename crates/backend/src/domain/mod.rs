pub mod chunk;
pub mod config;
pub mod metadata;
pub mod project;

pub use chunk::{Chunk, ChunkKind};
pub use config::{ChunkingStrategy, FtsEngineChoice, IndexConfig};
pub use metadata::{IndexMetadata, ModelIdentity};
pub use project::ProjectId;
