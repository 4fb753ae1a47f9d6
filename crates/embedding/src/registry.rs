use crate::{CloudProvider, EmbeddingError, EmbeddingProvider, LocalProvider, RetryConfig, ResilientProvider};
use sleuth_core::config::{DeviceHint, EmbeddingConfig, EmbeddingProvider as EmbeddingProviderKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Process-wide cache of constructed embedding providers, keyed by `(model_id, device)`.
///
/// Guarantees at most one live provider per key: a repeat `get_or_load` call
/// returns the cached handle, a miss constructs and health-checks a fresh one.
#[derive(Default)]
pub struct EmbedderRegistry {
  providers: Mutex<HashMap<(String, DeviceHint), Arc<dyn EmbeddingProvider>>>,
}

impl EmbedderRegistry {
  pub fn new() -> Self {
    Self { providers: Mutex::new(HashMap::new()) }
  }

  /// Returns the cached provider for `(config.model_id, config.device_hint)`, constructing
  /// and health-checking one on a cache miss.
  pub async fn get_or_load(&self, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let key = (config.model_id.clone(), config.device_hint);

    if let Some(provider) = self.providers.lock().expect("registry lock poisoned").get(&key) {
      return Ok(provider.clone());
    }

    let provider = build_provider(config)?;

    if !provider.is_available().await {
      return Err(EmbeddingError::NotAvailable(format!("provider for model '{}' failed health check", config.model_id)));
    }

    info!(model_id = %config.model_id, device = ?config.device_hint, provider = provider.name(), "loaded embedding provider");

    let provider: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    self.providers.lock().expect("registry lock poisoned").insert(key, provider.clone());
    Ok(provider)
  }

  /// Drops every cached provider, forcing the next `get_or_load` to reconstruct.
  pub fn clear(&self) {
    self.providers.lock().expect("registry lock poisoned").clear();
  }
}

fn build_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> {
  let retry_config = match config.provider {
    EmbeddingProviderKind::Local => RetryConfig::for_local(),
    EmbeddingProviderKind::Cloud => RetryConfig::for_cloud(),
  };

  let inner: Box<dyn EmbeddingProvider> = match config.provider {
    EmbeddingProviderKind::Local => {
      Box::new(LocalProvider::new().with_url(config.local_url.clone()).with_model(config.model_id.clone(), config.dimensions))
    }
    EmbeddingProviderKind::Cloud => {
      let api_key = config.cloud_api_key.clone().ok_or_else(|| EmbeddingError::NotAvailable("no cloud API key configured".to_string()))?;
      Box::new(CloudProvider::new(api_key).with_model(config.model_id.clone(), config.dimensions))
    }
  };

  Ok(Box::new(ResilientProviderBox::new(inner, retry_config)))
}

/// Type-erases `ResilientProvider<Box<dyn EmbeddingProvider>>` so `build_provider` can return
/// a single concrete boxed type regardless of which backend it wraps.
struct ResilientProviderBox(ResilientProvider<Box<dyn EmbeddingProvider>>);

impl ResilientProviderBox {
  fn new(inner: Box<dyn EmbeddingProvider>, config: RetryConfig) -> Self {
    Self(ResilientProvider::with_config(inner, config))
  }
}

#[async_trait::async_trait]
impl EmbeddingProvider for ResilientProviderBox {
  fn name(&self) -> &str {
    self.0.name()
  }

  fn model_id(&self) -> &str {
    self.0.model_id()
  }

  fn dimensions(&self) -> usize {
    self.0.dimensions()
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.0.embed(text).await
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.0.embed_batch(texts).await
  }

  async fn is_available(&self) -> bool {
    self.0.is_available().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sleuth_core::config::EmbeddingProvider as EmbeddingProviderKind;

  #[tokio::test]
  async fn get_or_load_fails_fast_when_local_server_unreachable() {
    let registry = EmbedderRegistry::new();
    let config = EmbeddingConfig {
      provider: EmbeddingProviderKind::Local,
      model_id: "qwen3-embedding".to_string(),
      device_hint: DeviceHint::Cpu,
      dimensions: 4096,
      local_url: "http://127.0.0.1:1".to_string(),
      cloud_api_key: None,
    };

    let result = registry.get_or_load(&config).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn get_or_load_fails_when_cloud_key_missing() {
    let registry = EmbedderRegistry::new();
    let config = EmbeddingConfig {
      provider: EmbeddingProviderKind::Cloud,
      model_id: "openai/text-embedding-3-small".to_string(),
      device_hint: DeviceHint::Cpu,
      dimensions: 1536,
      local_url: "http://localhost:11434".to_string(),
      cloud_api_key: None,
    };

    let result = registry.get_or_load(&config).await;
    assert!(matches!(result, Err(EmbeddingError::NotAvailable(_))));
  }

  #[tokio::test]
  async fn clear_forces_reconstruction() {
    let registry = EmbedderRegistry::new();
    assert!(registry.providers.lock().unwrap().is_empty());
    registry.clear();
    assert!(registry.providers.lock().unwrap().is_empty());
  }
}
