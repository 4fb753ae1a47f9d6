//! Indexer pipeline: normalize → denoise → chunk → encode → store, as one
//! sequential, cancellable, batch-at-a-time run.

use crate::chunker::Chunker;
use crate::task::ProgressSink;
use sleuth_core::{ChunkConfig, CollectionKind, Error, MetadataValue, Result, Stage, Statistics};
use sleuth_embedding::EmbeddingProvider;
use sleuth_extract::{NoiseRules, RawRow, flag_messages, normalize_images, normalize_messages};
use sleuth_store::{Row, Store};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::info;

/// Thin wrapper over a `watch` channel carrying a single cancellation flag.
/// Cheap to clone; every clone observes the same underlying signal.
#[derive(Clone)]
pub struct CancellationToken {
  receiver: watch::Receiver<bool>,
}

impl CancellationToken {
  pub fn is_cancelled(&self) -> bool {
    *self.receiver.borrow()
  }
}

/// The write half of a [`CancellationToken`]; held by whoever can cancel a
/// running job.
pub struct CancellationSource {
  sender: watch::Sender<bool>,
}

impl CancellationSource {
  pub fn new() -> (Self, CancellationToken) {
    let (sender, receiver) = watch::channel(false);
    (Self { sender }, CancellationToken { receiver })
  }

  pub fn cancel(&self) {
    let _ = self.sender.send(true);
  }
}

/// Hands out one `tokio::sync::Mutex` per collection name, held by the
/// Indexer for the duration of a `reset=true` run so two reset jobs against
/// the same collection can't interleave their stages.
#[derive(Default)]
pub struct CollectionLocks {
  locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = self.locks.lock().expect("collection locks poisoned");
    locks.entry(name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
  }
}

/// One ingestion run: raw rows in, two (or three) populated collections out.
pub struct IndexJob {
  pub store: Arc<Store>,
  pub embedder: Arc<dyn EmbeddingProvider>,
  pub collection_locks: Arc<CollectionLocks>,
  pub messages_collection: String,
  pub chunks_collection: String,
  pub images_collection: Option<String>,
  pub raw_messages: Vec<RawRow>,
  pub raw_images: Vec<RawRow>,
  pub source_tag: String,
  pub chunk_config: ChunkConfig,
  pub noise_rules: NoiseRules,
  pub batch_size: usize,
  pub reset: bool,
}

impl IndexJob {
  /// Run the pipeline to completion, reporting progress through `sink` and
  /// honoring `cancel` at each stage boundary.
  pub async fn run(self, cancel: CancellationToken, sink: &dyn ProgressSink) -> Result<Statistics> {
    let reset_guard = if self.reset {
      let lock = self.collection_locks.lock_for(&self.messages_collection);
      Some(lock.lock_owned().await)
    } else {
      None
    };

    let result = self.run_stages(&cancel, sink).await;
    drop(reset_guard);
    result
  }

  async fn run_stages(&self, cancel: &CancellationToken, sink: &dyn ProgressSink) -> Result<Statistics> {
    let mut stats = Statistics::default();

    // --- parsing (0 -> 25) ---
    check_cancelled(cancel)?;
    let start = Instant::now();
    sink.report(0, Stage::Parsing, "normalizing raw records");
    let (mut messages, message_stats) = normalize_messages(self.raw_messages.clone(), &self.source_tag);
    let (images, image_stats) = normalize_images(self.raw_images.clone(), &self.source_tag);
    stats.messages_parsed = message_stats.parsed;
    stats.messages_skipped = message_stats.skipped;
    stats.images_parsed = image_stats.parsed;
    stats.images_skipped = image_stats.skipped;
    stats.stage_durations_ms.push(("parsing".to_string(), start.elapsed().as_millis() as u64));
    sink.report(25, Stage::Parsing, "parsing complete");

    // --- denoising (25 -> 30) ---
    check_cancelled(cancel)?;
    let start = Instant::now();
    sink.report(25, Stage::Denoising, "flagging noise");
    flag_messages(&mut messages, &self.noise_rules);
    stats.noise_flagged = messages.iter().filter(|m| m.is_noise).count();
    stats.stage_durations_ms.push(("denoising".to_string(), start.elapsed().as_millis() as u64));
    sink.report(30, Stage::Denoising, "denoising complete");

    // --- chunking (30 -> 40) ---
    check_cancelled(cancel)?;
    let start = Instant::now();
    sink.report(30, Stage::Chunking, "building context chunks");
    let chunks = Chunker::new(self.chunk_config.clone()).chunk(&messages);
    stats.chunks_built = chunks.len();
    stats.stage_durations_ms.push(("chunking".to_string(), start.elapsed().as_millis() as u64));
    sink.report(40, Stage::Chunking, "chunking complete");

    // --- encoding messages (40 -> 65) ---
    check_cancelled(cancel)?;
    let start = Instant::now();
    sink.report(40, Stage::Encoding, "encoding messages");
    let message_texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    let message_vectors = self.embed_in_batches(&message_texts, 40, 65, sink).await?;
    stats.stage_durations_ms.push(("encoding_messages".to_string(), start.elapsed().as_millis() as u64));

    // --- encoding chunks (and images, sharing the same anchor) (65 -> 80) ---
    check_cancelled(cancel)?;
    let start = Instant::now();
    sink.report(65, Stage::Encoding, "encoding context chunks");
    let chunk_texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let chunk_vectors = self.embed_in_batches(&chunk_texts, 65, 80, sink).await?;
    let image_texts: Vec<&str> = images.iter().map(|i| i.description.as_str()).collect();
    let image_vectors =
      if image_texts.is_empty() { Vec::new() } else { self.embedder.embed_batch(&image_texts).await? };
    stats.stage_durations_ms.push(("encoding_chunks".to_string(), start.elapsed().as_millis() as u64));
    sink.report(80, Stage::Encoding, "encoding complete");

    // --- storage (80 -> 100) ---
    check_cancelled(cancel)?;
    let start = Instant::now();
    sink.report(80, Stage::Storage, "writing collections");
    let dim = self.embedder.dimensions();
    let model_id = self.embedder.model_id().to_string();

    self.write_collection(&self.messages_collection, CollectionKind::Messages, dim, &model_id).await?;
    let message_rows: Vec<Row> =
      messages.iter().zip(message_vectors).map(|(m, vector)| message_row(m, vector)).collect();
    self.store.upsert(&self.messages_collection, message_rows).await?;

    self.write_collection(&self.chunks_collection, CollectionKind::Chunks, dim, &model_id).await?;
    let chunk_rows: Vec<Row> = chunks.iter().zip(chunk_vectors).map(|(c, vector)| chunk_row(c, vector)).collect();
    self.store.upsert(&self.chunks_collection, chunk_rows).await?;

    if let Some(images_collection) = &self.images_collection
      && !images.is_empty()
    {
      self.write_collection(images_collection, CollectionKind::Images, dim, &model_id).await?;
      let image_rows: Vec<Row> = images.iter().zip(image_vectors).map(|(i, vector)| image_row(i, vector)).collect();
      self.store.upsert(images_collection, image_rows).await?;
    }

    stats.stage_durations_ms.push(("storage".to_string(), start.elapsed().as_millis() as u64));
    sink.report(100, Stage::Storage, "storage complete");

    info!(
      messages = stats.messages_parsed,
      chunks = stats.chunks_built,
      noise_flagged = stats.noise_flagged,
      "indexing run complete"
    );
    Ok(stats)
  }

  async fn write_collection(&self, name: &str, kind: CollectionKind, dim: usize, model_id: &str) -> Result<()> {
    if self.reset {
      self.store.reset_collection(name, kind, dim, model_id).await?;
    } else {
      self.store.create_collection(name, kind, dim, model_id).await?;
    }
    Ok(())
  }

  /// Embed `texts` in `batch_size`-sized groups, reporting intermediate
  /// progress spread linearly across `[entry, exit)`. This is the pipeline's
  /// back-pressure boundary: each batch is fully encoded before the next is
  /// requested, so at most one batch is ever in flight.
  async fn embed_in_batches(&self, texts: &[&str], entry: u8, exit: u8, sink: &dyn ProgressSink) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let batch_size = self.batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);
    let mut vectors = Vec::with_capacity(texts.len());

    for (batch_index, chunk) in texts.chunks(batch_size).enumerate() {
      let batch_vectors = self.embedder.embed_batch(chunk).await?;
      vectors.extend(batch_vectors);

      let fraction = (batch_index + 1) as f32 / total_batches as f32;
      let progress = entry as f32 + fraction * (exit - entry) as f32;
      sink.report(progress as u8, Stage::Encoding, &format!("encoded batch {}/{total_batches}", batch_index + 1));
    }

    Ok(vectors)
  }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
  if cancel.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
}

fn message_row(message: &sleuth_core::Message, vector: Vec<f32>) -> Row {
  let mut metadata = HashMap::new();
  if let Some(ts) = message.timestamp {
    metadata.insert("timestamp".to_string(), MetadataValue::Number(ts as f64));
  }
  metadata.insert("contact".to_string(), MetadataValue::Text(message.contact.clone()));
  if let Some(name) = &message.contact_name {
    metadata.insert("contact_name".to_string(), MetadataValue::Text(name.clone()));
  }
  metadata.insert("direction".to_string(), MetadataValue::Text(message.direction.to_string()));
  if let Some(app) = &message.app {
    metadata.insert("app".to_string(), MetadataValue::Text(app.clone()));
  }
  if let Some(lat) = message.gps_lat {
    metadata.insert("gps_lat".to_string(), MetadataValue::Number(lat));
  }
  if let Some(lon) = message.gps_lon {
    metadata.insert("gps_lon".to_string(), MetadataValue::Number(lon));
  }
  metadata.insert("is_noise".to_string(), MetadataValue::Bool(message.is_noise));
  metadata.insert("source_tag".to_string(), MetadataValue::Text(message.source_tag.clone()));

  Row { id: message.id.clone(), document: message.text.clone(), metadata, vector }
}

fn chunk_row(chunk: &sleuth_core::ContextChunk, vector: Vec<f32>) -> Row {
  let mut metadata = HashMap::new();
  if let Some(ts) = chunk.timestamp_start {
    metadata.insert("timestamp_start".to_string(), MetadataValue::Number(ts as f64));
  }
  if let Some(ts) = chunk.timestamp_end {
    metadata.insert("timestamp_end".to_string(), MetadataValue::Number(ts as f64));
  }
  metadata.insert("contact".to_string(), MetadataValue::Text(chunk.contact.clone()));
  if let Some(name) = &chunk.contact_name {
    metadata.insert("contact_name".to_string(), MetadataValue::Text(name.clone()));
  }
  let member_ids = serde_json::to_string(&chunk.member_ids).unwrap_or_default();
  metadata.insert("member_ids".to_string(), MetadataValue::Text(member_ids));
  metadata.insert("first_message_id".to_string(), MetadataValue::Text(chunk.first_message_id.clone()));
  metadata.insert("member_count".to_string(), MetadataValue::Number(chunk.member_count as f64));
  metadata.insert("is_noise".to_string(), MetadataValue::Bool(chunk.is_noise));

  Row { id: chunk.id.clone(), document: chunk.text.clone(), metadata, vector }
}

fn image_row(image: &sleuth_core::ImageRecord, vector: Vec<f32>) -> Row {
  let mut metadata = HashMap::new();
  metadata.insert("filename".to_string(), MetadataValue::Text(image.filename.clone()));
  metadata.insert("path".to_string(), MetadataValue::Text(image.path.clone()));
  if let Some(ts) = image.timestamp {
    metadata.insert("timestamp".to_string(), MetadataValue::Number(ts as f64));
  }
  if let Some(lat) = image.gps_lat {
    metadata.insert("gps_lat".to_string(), MetadataValue::Number(lat));
  }
  if let Some(lon) = image.gps_lon {
    metadata.insert("gps_lon".to_string(), MetadataValue::Number(lon));
  }
  metadata.insert("source_tag".to_string(), MetadataValue::Text(image.source_tag.clone()));

  Row { id: image.id.clone(), document: image.description.clone(), metadata, vector }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use serde_json::json;
  use sleuth_embedding::EmbeddingError;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;

  struct FakeEmbedder {
    dim: usize,
    calls: AtomicUsize,
  }

  impl FakeEmbedder {
    fn new(dim: usize) -> Self {
      Self { dim, calls: AtomicUsize::new(0) }
    }
  }

  #[async_trait]
  impl EmbeddingProvider for FakeEmbedder {
    fn name(&self) -> &str {
      "fake"
    }
    fn model_id(&self) -> &str {
      "fake-model"
    }
    fn dimensions(&self) -> usize {
      self.dim
    }
    async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
      Ok(vec![0.0; self.dim])
    }
    async fn embed_batch(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(texts.iter().map(|_| vec![1.0; self.dim]).collect())
    }
    async fn is_available(&self) -> bool {
      true
    }
  }

  struct NullSink;
  impl ProgressSink for NullSink {
    fn report(&self, _progress: u8, _stage: Stage, _message: &str) {}
  }

  fn raw_message(id: &str, text: &str, contact: &str) -> RawRow {
    let mut row = RawRow::new();
    row.insert("id".to_string(), json!(id));
    row.insert("text".to_string(), json!(text));
    row.insert("contact".to_string(), json!(contact));
    row
  }

  #[tokio::test]
  async fn run_populates_messages_and_chunks_collections() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path()).await.unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::new(4));

    let job = IndexJob {
      store: store.clone(),
      embedder,
      collection_locks: Arc::new(CollectionLocks::new()),
      messages_collection: "messages_t1".to_string(),
      chunks_collection: "chunks_t1".to_string(),
      images_collection: None,
      raw_messages: vec![
        raw_message("m1", "hello", "alice"),
        raw_message("m2", "world", "alice"),
        raw_message("m3", "again", "alice"),
      ],
      raw_images: vec![],
      source_tag: "batch1".to_string(),
      chunk_config: ChunkConfig { window_size: 1, overlap: 0 },
      noise_rules: NoiseRules::load_default(),
      batch_size: 2,
      reset: false,
    };

    let (_source, cancel) = CancellationSource::new();
    let stats = job.run(cancel, &NullSink).await.unwrap();

    assert_eq!(stats.messages_parsed, 3);
    assert_eq!(stats.chunks_built, 3);
    assert_eq!(store.count("messages_t1").await.unwrap(), 3);
    assert_eq!(store.count("chunks_t1").await.unwrap(), 3);
  }

  #[tokio::test]
  async fn pre_cancelled_token_fails_before_any_write() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path()).await.unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::new(4));

    let job = IndexJob {
      store: store.clone(),
      embedder,
      collection_locks: Arc::new(CollectionLocks::new()),
      messages_collection: "messages_t1".to_string(),
      chunks_collection: "chunks_t1".to_string(),
      images_collection: None,
      raw_messages: vec![raw_message("m1", "hello", "alice")],
      raw_images: vec![],
      source_tag: "batch1".to_string(),
      chunk_config: ChunkConfig::default(),
      noise_rules: NoiseRules::load_default(),
      batch_size: 10,
      reset: false,
    };

    let (source, cancel) = CancellationSource::new();
    source.cancel();
    let result = job.run(cancel, &NullSink).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(store.list_collections().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn reset_true_drops_and_recreates_collections() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path()).await.unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::new(4));
    let locks = Arc::new(CollectionLocks::new());

    let make_job = |reset: bool| IndexJob {
      store: store.clone(),
      embedder: embedder.clone(),
      collection_locks: locks.clone(),
      messages_collection: "messages_t1".to_string(),
      chunks_collection: "chunks_t1".to_string(),
      images_collection: None,
      raw_messages: vec![raw_message("m1", "hello", "alice")],
      raw_images: vec![],
      source_tag: "batch1".to_string(),
      chunk_config: ChunkConfig { window_size: 1, overlap: 0 },
      noise_rules: NoiseRules::load_default(),
      batch_size: 10,
      reset,
    };

    let (_s1, c1) = CancellationSource::new();
    make_job(false).run(c1, &NullSink).await.unwrap();
    let (_s2, c2) = CancellationSource::new();
    make_job(true).run(c2, &NullSink).await.unwrap();

    assert_eq!(store.count("messages_t1").await.unwrap(), 1);
  }

  #[tokio::test]
  async fn embed_in_batches_respects_batch_size() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path()).await.unwrap());
    let embedder = Arc::new(FakeEmbedder::new(4));

    let job = IndexJob {
      store,
      embedder: embedder.clone(),
      collection_locks: Arc::new(CollectionLocks::new()),
      messages_collection: "messages_t1".to_string(),
      chunks_collection: "chunks_t1".to_string(),
      images_collection: None,
      raw_messages: vec![],
      raw_images: vec![],
      source_tag: "batch1".to_string(),
      chunk_config: ChunkConfig::default(),
      noise_rules: NoiseRules::load_default(),
      batch_size: 2,
      reset: false,
    };

    let texts = vec!["a", "b", "c", "d", "e"];
    let vectors = job.embed_in_batches(&texts, 40, 65, &NullSink).await.unwrap();
    assert_eq!(vectors.len(), 5);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3); // ceil(5/2) = 3 batches
  }
}
