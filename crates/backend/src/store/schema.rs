//! Arrow schemas for the on-disk tables.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};

pub const CHUNKS_TABLE: &str = "chunks";
pub const FTS_TABLE: &str = "fts";

/// Schema for a chunk table at a fixed vector dimension.
pub fn chunks_schema(dimension: usize) -> SchemaRef {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("path", DataType::Utf8, false),
    Field::new("start_line", DataType::UInt32, false),
    Field::new("end_line", DataType::UInt32, false),
    Field::new("text", DataType::Utf8, false),
    Field::new("fingerprint", DataType::Utf8, false),
    Field::new("kind", DataType::Utf8, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
      true,
    ),
  ]))
}

/// Schema for the FTS catalog: the same key space as the chunk table,
/// text only.
pub fn fts_schema() -> SchemaRef {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("path", DataType::Utf8, false),
    Field::new("text", DataType::Utf8, false),
  ]))
}

/// The fixed vector dimension a chunk schema was created with, if the
/// schema has a well-formed vector column.
pub fn schema_dimension(schema: &Schema) -> Option<usize> {
  match schema.field_with_name("vector").ok()?.data_type() {
    DataType::FixedSizeList(_, size) => Some(*size as usize),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_dimension_round_trip() {
    let schema = chunks_schema(384);
    assert_eq!(schema_dimension(&schema), Some(384));
    let schema = chunks_schema(768);
    assert_eq!(schema_dimension(&schema), Some(768));
  }

  #[test]
  fn test_fts_schema_has_no_vector() {
    assert_eq!(schema_dimension(&fts_schema()), None);
  }
}
