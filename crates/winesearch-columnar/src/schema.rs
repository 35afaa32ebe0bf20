use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const TABLE_NAME: &str = "wines";

pub fn vector_type(dim: i32) -> DataType {
    DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim)
}

/// Column names match `WineRecord`'s serialised field names so rows read
/// back as canonical records.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("description", DataType::Utf8, true),
        Field::new("variety", DataType::Utf8, false),
        Field::new("country", DataType::Utf8, false),
        Field::new("province", DataType::Utf8, true),
        Field::new("winery", DataType::Utf8, false),
        Field::new("points", DataType::Int32, false),
        Field::new("price", DataType::Float64, true),
        Field::new("taster_name", DataType::Utf8, true),
        Field::new("taster_twitter_handle", DataType::Utf8, true),
        Field::new("designation", DataType::Utf8, true),
        Field::new("region_1", DataType::Utf8, true),
        Field::new("region_2", DataType::Utf8, true),
        Field::new("vector", vector_type(dim), true),
    ]))
}
