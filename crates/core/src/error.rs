use thiserror::Error;

/// The shared domain-error root. Every crate boundary below this one (`sleuth-store`,
/// `sleuth-embedding`) wraps its own backend errors and converts them into one of
/// these variants before they cross the boundary, so callers of `sleuth-index`
/// only ever match on this one type.
#[derive(Error, Debug)]
pub enum Error {
  #[error("embedding model unavailable: {0}")]
  ModelUnavailable(String),

  #[error("encode failed: {0}")]
  EncodeFailed(String),

  #[error("dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("collection not found: {0}")]
  CollectionNotFound(String),

  #[error("not found: {entity} {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("invalid predicate: {0}")]
  InvalidPredicate(String),

  #[error("corrupt index: {0}")]
  CorruptIndex(String),

  #[error("task not found: {0}")]
  TaskNotFound(String),

  #[error("task cancelled")]
  Cancelled,

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
