use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, TimeUnit};

/// One table per collection, all sharing this layout.
///
/// `metadata` holds the document's metadata map as a JSON object string.
pub fn corpus_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            true,
        ),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}
