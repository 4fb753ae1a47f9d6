//! Arrow schemas, one per [`CollectionKind`], plus the `_collections` registry
//! table that tracks name/kind/dimension/model without requiring every table to
//! be opened just to answer `list_collections`.

use arrow_schema::{DataType, Field, Schema};
use sleuth_core::CollectionKind;
use std::sync::Arc;

fn vector_field(dim: usize) -> Field {
  Field::new(
    "vector",
    DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
    true,
  )
}

/// Schema for a `messages` collection.
pub fn messages_schema(dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("document", DataType::Utf8, false),
    Field::new("timestamp", DataType::Int64, true),
    Field::new("contact", DataType::Utf8, false),
    Field::new("contact_name", DataType::Utf8, true),
    Field::new("direction", DataType::Utf8, false),
    Field::new("app", DataType::Utf8, true),
    Field::new("gps_lat", DataType::Float64, true),
    Field::new("gps_lon", DataType::Float64, true),
    Field::new("is_noise", DataType::Boolean, false),
    Field::new("source_tag", DataType::Utf8, false),
    vector_field(dim),
  ]))
}

/// Schema for a `chunks` collection.
pub fn chunks_schema(dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("document", DataType::Utf8, false),
    Field::new("timestamp_start", DataType::Int64, true),
    Field::new("timestamp_end", DataType::Int64, true),
    Field::new("contact", DataType::Utf8, false),
    Field::new("contact_name", DataType::Utf8, true),
    Field::new("member_ids", DataType::Utf8, false), // JSON array
    Field::new("first_message_id", DataType::Utf8, false),
    Field::new("member_count", DataType::UInt32, false),
    Field::new("is_noise", DataType::Boolean, false),
    vector_field(dim),
  ]))
}

/// Schema for an `images` collection.
pub fn images_schema(dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("document", DataType::Utf8, false),
    Field::new("filename", DataType::Utf8, false),
    Field::new("path", DataType::Utf8, false),
    Field::new("timestamp", DataType::Int64, true),
    Field::new("gps_lat", DataType::Float64, true),
    Field::new("gps_lon", DataType::Float64, true),
    Field::new("source_tag", DataType::Utf8, false),
    vector_field(dim),
  ]))
}

/// Dispatch to the schema for a given kind and dimension.
pub fn schema_for_kind(kind: CollectionKind, dim: usize) -> Arc<Schema> {
  match kind {
    CollectionKind::Messages => messages_schema(dim),
    CollectionKind::Chunks => chunks_schema(dim),
    CollectionKind::Images => images_schema(dim),
  }
}

/// Schema for the `_collections` registry table: one row per collection.
pub fn collections_registry_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("name", DataType::Utf8, false),
    Field::new("kind", DataType::Utf8, false),
    Field::new("embedding_dim", DataType::UInt32, false),
    Field::new("embedding_model_id", DataType::Utf8, false),
    Field::new("created_at", DataType::Int64, false),
  ]))
}

pub const COLLECTIONS_REGISTRY_TABLE: &str = "_collections";
