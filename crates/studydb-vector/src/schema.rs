use arrow_schema::{DataType, Field, Schema};
use std::collections::HashMap;
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const VECTOR_COLUMN: &str = "vector";
pub const DIM_KEY: &str = "studydb.dim";
pub const FORMAT_KEY: &str = "studydb.format";
pub const FORMAT_VERSION: &str = "1";

pub fn vector_item_field() -> Arc<Field> {
	Arc::new(Field::new("item", DataType::Float32, true))
}

/// Snapshot layout: one row per vector, the dimension repeated in the schema
/// metadata so a reader can reject a snapshot built for another model.
pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
	let metadata = HashMap::from([
		(DIM_KEY.to_string(), dim.to_string()),
		(FORMAT_KEY.to_string(), FORMAT_VERSION.to_string()),
	]);
	Arc::new(Schema::new_with_metadata(
		vec![
			Field::new(ID_COLUMN, DataType::Int64, false),
			Field::new(VECTOR_COLUMN, DataType::FixedSizeList(vector_item_field(), dim as i32), false),
		],
		metadata,
	))
}

/// Dimension recorded in a snapshot schema, if any.
pub fn snapshot_dim(schema: &Schema) -> Option<usize> {
	schema.metadata().get(DIM_KEY).and_then(|d| d.parse().ok())
}
