pub mod cloud;
pub mod error;
pub mod local;
pub mod provider;
pub mod registry;
pub mod resilient;

pub use cloud::CloudProvider;
pub use error::EmbeddingError;
pub use local::{LocalHealthStatus, LocalProvider};
pub use provider::EmbeddingProvider;
pub use registry::EmbedderRegistry;
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error, wrap_resilient, wrap_resilient_arc};
