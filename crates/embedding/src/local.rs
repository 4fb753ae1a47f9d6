use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const DEFAULT_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen3-embedding";
const DEFAULT_DIMENSIONS: usize = 4096;

/// A locally hosted embedding model reached over loopback HTTP.
///
/// Talks the Ollama-style `/api/embeddings` and `/api/tags` protocol, the
/// common shape for self-hosted embedding servers.
#[derive(Debug, Clone)]
pub struct LocalProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
}

impl LocalProvider {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: DEFAULT_URL.to_string(),
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  fn embeddings_url(&self) -> String {
    format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
  }

  fn tags_url(&self) -> String {
    format!("{}/api/tags", self.base_url.trim_end_matches('/'))
  }

  /// Probes the server for reachability and whether the configured model is present.
  pub async fn check_health(&self) -> LocalHealthStatus {
    match self.client.get(self.tags_url()).send().await {
      Ok(response) if response.status().is_success() => match response.json::<TagsResponse>().await {
        Ok(tags) => {
          let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
          let configured_model_available = models.iter().any(|m| m == &self.model || m.starts_with(&format!("{}:", self.model)));
          LocalHealthStatus {
            available: true,
            configured_model: self.model.clone(),
            configured_model_available,
            models,
          }
        }
        Err(_) => LocalHealthStatus {
          available: true,
          models: Vec::new(),
          configured_model: self.model.clone(),
          configured_model_available: false,
        },
      },
      _ => LocalHealthStatus {
        available: false,
        models: Vec::new(),
        configured_model: self.model.clone(),
        configured_model_available: false,
      },
    }
  }
}

impl Default for LocalProvider {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone)]
pub struct LocalHealthStatus {
  pub available: bool,
  pub models: Vec<String>,
  pub configured_model: String,
  pub configured_model_available: bool,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
  #[serde(default)]
  models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
  name: String,
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
  fn name(&self) -> &str {
    "local"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let request = EmbeddingRequest { model: &self.model, prompt: text };

    debug!("embedding text with local provider: {} chars", text.len());

    let response = self.client.post(self.embeddings_url()).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("local embedding request failed: {} - {}", status, body);
      return Err(EmbeddingError::ProviderError(format!("local provider returned {}: {}", status, body)));
    }

    let result: EmbeddingResponse = response.json().await?;
    Ok(result.embedding)
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(4));
    let futures = texts.iter().map(|text| {
      let semaphore = semaphore.clone();
      let text = *text;
      async move {
        let _permit = semaphore.acquire().await.expect("semaphore closed");
        self.embed(text).await
      }
    });

    futures::future::join_all(futures).await.into_iter().collect()
  }

  async fn is_available(&self) -> bool {
    self.check_health().await.available
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_uses_defaults() {
    let provider = LocalProvider::new();
    assert_eq!(provider.name(), "local");
    assert_eq!(provider.model_id(), DEFAULT_MODEL);
    assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
  }

  #[test]
  fn with_url_trims_trailing_slash_in_endpoints() {
    let provider = LocalProvider::new().with_url("http://localhost:11434/");
    assert_eq!(provider.embeddings_url(), "http://localhost:11434/api/embeddings");
    assert_eq!(provider.tags_url(), "http://localhost:11434/api/tags");
  }

  #[test]
  fn with_model_overrides_model_and_dimensions() {
    let provider = LocalProvider::new().with_model("custom-embed", 768);
    assert_eq!(provider.model_id(), "custom-embed");
    assert_eq!(provider.dimensions(), 768);
  }

  #[tokio::test]
  async fn check_health_reports_unavailable_when_unreachable() {
    let provider = LocalProvider::new().with_url("http://127.0.0.1:1");
    let status = provider.check_health().await;
    assert!(!status.available);
    assert!(!status.configured_model_available);
  }

  #[tokio::test]
  async fn is_available_false_when_server_unreachable() {
    let provider = LocalProvider::new().with_url("http://127.0.0.1:1");
    assert!(!provider.is_available().await);
  }
}
