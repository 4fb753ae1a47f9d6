use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
  #[error("embedding model unavailable: {0}")]
  NotAvailable(String),
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("provider error: {0}")]
  ProviderError(String),
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
}

impl From<EmbeddingError> for sleuth_core::Error {
  fn from(err: EmbeddingError) -> Self {
    match err {
      EmbeddingError::NotAvailable(msg) => sleuth_core::Error::ModelUnavailable(msg),
      EmbeddingError::Request(e) => sleuth_core::Error::EncodeFailed(e.to_string()),
      EmbeddingError::ProviderError(msg) => sleuth_core::Error::EncodeFailed(msg),
      EmbeddingError::Network(msg) => sleuth_core::Error::EncodeFailed(msg),
      EmbeddingError::Timeout => sleuth_core::Error::EncodeFailed("request timed out".to_string()),
    }
  }
}
