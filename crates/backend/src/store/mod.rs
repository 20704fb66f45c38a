pub mod fts;
pub mod schema;
pub mod tokenizer;
pub mod vector;

pub use fts::{FtsBackendKind, FtsEntry, FtsStore};
pub use vector::{StoreError, VectorStore};
