use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_URL: &str = "https://openrouter.ai/api/v1/embeddings";
const DEFAULT_MODEL: &str = "openai/text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

/// A hosted embeddings API reached with a bearer token.
#[derive(Debug, Clone)]
pub struct CloudProvider {
  client: reqwest::Client,
  url: String,
  api_key: String,
  model: String,
  dimensions: usize,
}

impl CloudProvider {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      url: DEFAULT_URL.to_string(),
      api_key: api_key.into(),
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
  Single(&'a str),
  Batch(Vec<&'a str>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for CloudProvider {
  fn name(&self) -> &str {
    "cloud"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let request = EmbeddingRequest { model: &self.model, input: EmbeddingInput::Single(text) };

    debug!("embedding text with cloud provider: {} chars", text.len());

    let response = self
      .client
      .post(&self.url)
      .header("Authorization", format!("Bearer {}", self.api_key))
      .header("Content-Type", "application/json")
      .json(&request)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("cloud embedding request failed: {} - {}", status, body);
      return Err(EmbeddingError::ProviderError(format!("cloud provider returned {}: {}", status, body)));
    }

    let result: EmbeddingResponse = response.json().await?;
    result.data.into_iter().next().map(|d| d.embedding).ok_or_else(|| EmbeddingError::ProviderError("no embedding in response".into()))
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let request = EmbeddingRequest { model: &self.model, input: EmbeddingInput::Batch(texts.to_vec()) };

    debug!("embedding {} texts with cloud provider", texts.len());

    let response = self
      .client
      .post(&self.url)
      .header("Authorization", format!("Bearer {}", self.api_key))
      .header("Content-Type", "application/json")
      .json(&request)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("cloud batch embedding request failed: {} - {}", status, body);
      return Err(EmbeddingError::ProviderError(format!("cloud provider returned {}: {}", status, body)));
    }

    let result: EmbeddingResponse = response.json().await?;
    Ok(result.data.into_iter().map(|d| d.embedding).collect())
  }

  async fn is_available(&self) -> bool {
    !self.api_key.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_uses_defaults() {
    let provider = CloudProvider::new("test-key");
    assert_eq!(provider.name(), "cloud");
    assert_eq!(provider.model_id(), DEFAULT_MODEL);
    assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
  }

  #[test]
  fn with_model_overrides_model_and_dimensions() {
    let provider = CloudProvider::new("test-key").with_model("custom/model", 512);
    assert_eq!(provider.model_id(), "custom/model");
    assert_eq!(provider.dimensions(), 512);
  }

  #[tokio::test]
  async fn is_available_true_with_key() {
    let provider = CloudProvider::new("test-key");
    assert!(provider.is_available().await);
  }

  #[tokio::test]
  async fn is_available_false_without_key() {
    let provider = CloudProvider::new("");
    assert!(!provider.is_available().await);
  }
}
