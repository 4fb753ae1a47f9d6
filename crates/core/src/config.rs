//! Centralized configuration, with per-project overrides.
//!
//! Config priority: project-relative (.sleuth/config.toml) > user (~/.config/sleuth/config.toml) > default.
//! Runtime changes affect only subsequent operations — a collection keeps the
//! embedding model and dimension it was created with regardless of later edits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding provider options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
  #[default]
  Local,
  Cloud,
}

/// Device hint passed through to the embedding provider at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceHint {
  #[default]
  Cpu,
  Gpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  /// Which embedding backend to use.
  pub provider: EmbeddingProvider,

  /// Model identifier (e.g. "qwen3-embedding", "openai/text-embedding-3-small").
  pub model_id: String,

  /// Device hint forwarded to the provider at load time.
  pub device_hint: DeviceHint,

  /// Embedding dimensions (must match the model's actual output width).
  pub dimensions: usize,

  /// Local model server URL (only used when provider = local).
  pub local_url: String,

  /// Cloud API key (only used when provider = cloud).
  /// If not set, reads from the SLEUTH_CLOUD_API_KEY environment variable.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cloud_api_key: Option<String>,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProvider::Local,
      model_id: "qwen3-embedding".to_string(),
      device_hint: DeviceHint::Cpu,
      dimensions: 4096,
      local_url: "http://localhost:11434".to_string(),
      cloud_api_key: None,
    }
  }
}

// ============================================================================
// Chunking Configuration
// ============================================================================

/// Sliding-window chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
  /// Window size `W`, in messages (must be >= 1).
  pub window_size: usize,

  /// Overlap `O` between consecutive windows (must satisfy 0 <= O < W).
  pub overlap: usize,
}

impl Default for ChunkConfig {
  fn default() -> Self {
    Self { window_size: 20, overlap: 5 }
  }
}

// ============================================================================
// Search Configuration
// ============================================================================

/// Default retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
  #[default]
  Ann,
  Knn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  /// Default retrieval mode when a query does not specify one.
  pub default_mode: RetrievalMode,

  /// Default number of results.
  pub default_k: usize,

  /// Default value of `exclude_noise` when a query does not specify one.
  pub default_exclude_noise: bool,

  /// Optional distance ceiling; rows beyond it are dropped regardless of k.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distance_ceiling: Option<f32>,

  /// Over-retrieval multiplier applied ahead of the geographic post-filter.
  pub geo_over_retrieval_multiplier: f32,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      default_mode: RetrievalMode::Ann,
      default_k: 10,
      default_exclude_noise: false,
      distance_ceiling: None,
      geo_over_retrieval_multiplier: 2.0,
    }
  }
}

// ============================================================================
// Store Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Root directory under which collections are persisted.
  pub storage_root: String,

  /// Path to an external noise-rules file (substring/sender patterns, one per
  /// line); when absent, the built-in default rule set is used.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub noise_rules_file: Option<String>,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { storage_root: "./sleuth-data".to_string(), noise_rules_file: None }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(default)]
  pub embedding: EmbeddingConfig,

  #[serde(default)]
  pub chunk: ChunkConfig,

  #[serde(default)]
  pub search: SearchConfig,

  #[serde(default)]
  pub store: StoreConfig,
}

impl Config {
  /// Load config for a project, falling back to the user config, then defaults.
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(content) = std::fs::read_to_string(&project_config)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(content) = std::fs::read_to_string(&user_config_path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    Self::default()
  }

  /// The user-level config path.
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("sleuth").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("sleuth").join("config.toml"))
  }

  /// The project-relative config path.
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".sleuth").join("config.toml")
  }

  /// Whether a collection created with `stored_dimensions` would need re-embedding
  /// under the current config. Never mutates an existing collection itself —
  /// callers decide whether to act on this.
  pub fn needs_reembedding(&self, stored_dimensions: usize) -> bool {
    self.embedding.dimensions != stored_dimensions
  }

  /// Emit a fully annotated TOML skeleton.
  pub fn generate_template() -> String {
    r#"# Sleuth configuration
# Place in .sleuth/config.toml (project) or ~/.config/sleuth/config.toml (user)

[embedding]
# Backend: local (an HTTP-served model reachable on loopback) or cloud (hosted API)
provider = "local"

# Model identifier
model_id = "qwen3-embedding"

# Device hint passed to the provider at load time: cpu or gpu
device_hint = "cpu"

# Embedding dimensions (must match the model's actual output width)
# WARNING: changing dimensions requires re-embedding into a new collection.
dimensions = 4096

# Local model server URL (for provider = local)
local_url = "http://localhost:11434"

# Cloud API key (for provider = cloud)
# Can also be set via the SLEUTH_CLOUD_API_KEY environment variable
# cloud_api_key = "..."

[chunk]
# Sliding window size, in messages
window_size = 20

# Overlap between consecutive windows (must be < window_size)
overlap = 5

[search]
# Default retrieval mode: ann or knn
default_mode = "ann"

# Default number of results
default_k = 10

# Default value of exclude_noise
default_exclude_noise = false

# Optional distance ceiling (uncomment to enable)
# distance_ceiling = 0.4

# Over-retrieval multiplier applied ahead of the geographic post-filter
geo_over_retrieval_multiplier = 2.0

[store]
# Root directory under which collections are persisted
storage_root = "./sleuth-data"

# Path to an external noise-rules file (uncomment to override the built-in list)
# noise_rules_file = "./noise-rules.txt"
"#
    .to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn default_embedding_config() {
    let config = EmbeddingConfig::default();
    assert_eq!(config.provider, EmbeddingProvider::Local);
    assert_eq!(config.model_id, "qwen3-embedding");
    assert_eq!(config.dimensions, 4096);
  }

  #[test]
  fn default_chunk_config_satisfies_overlap_invariant() {
    let config = ChunkConfig::default();
    assert!(config.window_size >= 1);
    assert!(config.overlap < config.window_size);
  }

  #[test]
  fn load_project_config_overrides_defaults() {
    let temp = TempDir::new().unwrap();
    let sleuth_dir = temp.path().join(".sleuth");
    std::fs::create_dir_all(&sleuth_dir).unwrap();

    let config_content = r#"
[embedding]
dimensions = 768

[chunk]
window_size = 10
overlap = 2
"#;
    std::fs::write(sleuth_dir.join("config.toml"), config_content).unwrap();

    let config = Config::load_for_project(temp.path());
    assert_eq!(config.embedding.dimensions, 768);
    assert_eq!(config.chunk.window_size, 10);
    assert_eq!(config.chunk.overlap, 2);
  }

  #[test]
  fn load_default_when_no_config_present() {
    let temp = TempDir::new().unwrap();
    let config = Config::load_for_project(temp.path());
    assert_eq!(config.embedding.dimensions, 4096);
    assert_eq!(config.chunk.window_size, 20);
  }

  #[test]
  fn generate_template_contains_every_section() {
    let template = Config::generate_template();
    assert!(template.contains("[embedding]"));
    assert!(template.contains("[chunk]"));
    assert!(template.contains("[search]"));
    assert!(template.contains("[store]"));
  }

  #[test]
  fn toml_round_trip_preserves_values() {
    let config = Config {
      embedding: EmbeddingConfig { provider: EmbeddingProvider::Cloud, dimensions: 1536, ..Default::default() },
      ..Default::default()
    };

    let toml_str = toml::to_string_pretty(&config).unwrap();
    let parsed: Config = toml::from_str(&toml_str).unwrap();

    assert_eq!(parsed.embedding.provider, EmbeddingProvider::Cloud);
    assert_eq!(parsed.embedding.dimensions, 1536);
  }

  #[test]
  fn needs_reembedding_compares_against_stored_dimension() {
    let config = Config { embedding: EmbeddingConfig { dimensions: 1536, ..Default::default() }, ..Default::default() };
    assert!(config.needs_reembedding(4096));
    assert!(!config.needs_reembedding(1536));
  }
}
