use sleuth_core::MetadataValue;
use std::collections::HashMap;

/// One stored record: an opaque id, the indexed document text, typed scalar
/// metadata, and the embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
  pub id: String,
  pub document: String,
  pub metadata: HashMap<String, MetadataValue>,
  pub vector: Vec<f32>,
}

/// A row paired with its distance from a query vector (cosine domain).
#[derive(Debug, Clone)]
pub struct ScoredRow {
  pub row: Row,
  pub distance: f32,
}

/// Retrieval mode for [`crate::Store::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
  /// LanceDB's native approximate nearest-neighbor index.
  Ann,
  /// Exhaustive, index-free exact scan.
  Knn,
}
