use thiserror::Error;

/// Errors this crate can actually fail at. Converted into [`sleuth_core::Error`]
/// at the crate boundary so callers only ever match on the shared domain error.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("lancedb error: {0}")]
  Lance(#[from] lancedb::Error),

  #[error("arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("collection not found: {0}")]
  CollectionNotFound(String),

  #[error("collection already exists with different dimension: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("column missing or wrong type: {0}")]
  CorruptRow(String),

  #[error("not found: {0}")]
  NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for sleuth_core::Error {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::CollectionNotFound(name) => sleuth_core::Error::CollectionNotFound(name),
      StoreError::DimensionMismatch { expected, actual } => sleuth_core::Error::DimensionMismatch { expected, actual },
      StoreError::NotFound(id) => sleuth_core::Error::NotFound { entity: "row", id },
      StoreError::Lance(e) => sleuth_core::Error::CorruptIndex(e.to_string()),
      StoreError::Arrow(e) => sleuth_core::Error::CorruptIndex(e.to_string()),
      StoreError::CorruptRow(msg) => sleuth_core::Error::CorruptIndex(msg),
      StoreError::Io(e) => sleuth_core::Error::Io(e),
      StoreError::Json(e) => sleuth_core::Error::Json(e),
    }
  }
}
