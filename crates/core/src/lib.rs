pub mod config;
pub mod entities;
pub mod error;
pub mod naming;
pub mod ordering;

pub use config::{ChunkConfig, Config, DeviceHint, EmbeddingConfig, EmbeddingProvider, RetrievalMode, SearchConfig, StoreConfig};
pub use entities::{
  CollectionInfo, CollectionKind, ContextChunk, Direction, ImageRecord, Message, MetadataValue, Stage, Statistics,
  Task, TaskId, TaskState,
};
pub use error::{Error, Result};
pub use naming::{collection_name, validate_collection_name};
pub use ordering::{by_timestamp_then_id, sort_by_timestamp_then_id};
