use crate::EmbeddingError;
use async_trait::async_trait;

/// Adapter seam for a single embedding model backend.
///
/// One trait object per `(model_id, device)` pair, cached by `EmbedderRegistry`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
  async fn is_available(&self) -> bool;
}
