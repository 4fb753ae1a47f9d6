//! Domain entities shared by every downstream crate: messages, the chunks derived
//! from them, image records, collection metadata, and indexing tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which endpoint originated a message, relative to the evidence owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Incoming,
  Outgoing,
  Unknown,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Direction::Incoming => "incoming",
      Direction::Outgoing => "outgoing",
      Direction::Unknown => "unknown",
    };
    f.write_str(s)
  }
}

/// A single normalized message, the atomic unit the rest of the pipeline operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub id: String,
  pub text: String,
  pub timestamp: Option<i64>,
  pub contact: String,
  pub contact_name: Option<String>,
  pub direction: Direction,
  pub app: Option<String>,
  pub gps_lat: Option<f64>,
  pub gps_lon: Option<f64>,
  pub is_noise: bool,
  pub source_tag: String,
}

/// An overlapping conversational window derived from a run of messages in one contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
  pub id: String,
  pub text: String,
  pub timestamp_start: Option<i64>,
  pub timestamp_end: Option<i64>,
  pub contact: String,
  pub contact_name: Option<String>,
  pub member_ids: Vec<String>,
  pub first_message_id: String,
  pub member_count: usize,
  pub is_noise: bool,
}

impl ContextChunk {
  /// The derived id formula of the data model: `<contact>:<first_message_id>:<member_count>`.
  pub fn derive_id(contact: &str, first_message_id: &str, member_count: usize) -> String {
    format!("{contact}:{first_message_id}:{member_count}")
  }
}

/// A captioned image, indexed by its caption text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
  pub id: String,
  pub description: String,
  pub filename: String,
  pub path: String,
  pub timestamp: Option<i64>,
  pub gps_lat: Option<f64>,
  pub gps_lon: Option<f64>,
  pub source_tag: String,
}

/// The three record shapes a collection can hold, and the naming prefix each uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
  Messages,
  Chunks,
  Images,
}

impl CollectionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      CollectionKind::Messages => "messages",
      CollectionKind::Chunks => "chunks",
      CollectionKind::Images => "images",
    }
  }

  /// The `kind_prefix` of the `<kind_prefix>_<batch_tag>` collection naming scheme.
  pub fn prefix(&self) -> &'static str {
    self.as_str()
  }
}

impl fmt::Display for CollectionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CollectionKind {
  type Err = crate::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "messages" => Ok(CollectionKind::Messages),
      "chunks" => Ok(CollectionKind::Chunks),
      "images" => Ok(CollectionKind::Images),
      other => Err(crate::Error::InvalidPredicate(format!("unknown collection kind: {other}"))),
    }
  }
}

/// Registry-level description of a collection, independent of its row contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
  pub name: String,
  pub kind: CollectionKind,
  pub embedding_dim: usize,
  pub embedding_model_id: String,
  pub created_at: i64,
  pub record_count: usize,
}

/// A scalar metadata value. Explicit and tagged rather than a raw JSON value, so
/// callers never have to sniff types out of a dynamic dictionary at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
  Text(String),
  Number(f64),
  Bool(bool),
  Null,
}

impl fmt::Display for MetadataValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MetadataValue::Text(s) => f.write_str(s),
      MetadataValue::Number(n) => write!(f, "{n}"),
      MetadataValue::Bool(b) => write!(f, "{b}"),
      MetadataValue::Null => f.write_str("null"),
    }
  }
}

/// Opaque, process-lifetime-unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Lifecycle state of an indexing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
  Pending,
  Running,
  Completed,
  Failed,
}

impl fmt::Display for TaskState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TaskState::Pending => "pending",
      TaskState::Running => "running",
      TaskState::Completed => "completed",
      TaskState::Failed => "failed",
    };
    f.write_str(s)
  }
}

/// Indexer pipeline stage, in execution order. Each carries the progress anchors
/// from the pipeline design (§4.6 of the project spec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Parsing,
  Denoising,
  Chunking,
  Encoding,
  Storage,
}

impl Stage {
  /// `(entry, exit)` progress anchors for this stage.
  pub fn progress_range(&self) -> (u8, u8) {
    match self {
      Stage::Parsing => (0, 25),
      Stage::Denoising => (25, 30),
      Stage::Chunking => (30, 40),
      Stage::Encoding => (40, 80),
      Stage::Storage => (80, 100),
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Stage::Parsing => "parsing",
      Stage::Denoising => "denoising",
      Stage::Chunking => "chunking",
      Stage::Encoding => "encoding",
      Stage::Storage => "storage",
    };
    f.write_str(s)
  }
}

/// Per-stage counts and durations collected over the lifetime of an indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
  pub messages_parsed: usize,
  pub messages_skipped: usize,
  pub images_parsed: usize,
  pub images_skipped: usize,
  pub chunks_built: usize,
  pub noise_flagged: usize,
  pub stage_durations_ms: Vec<(String, u64)>,
}

/// Current snapshot of a task's state, as held by the task registry and mirrored
/// into progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub task_id: TaskId,
  pub state: TaskState,
  pub progress: u8,
  pub stage: Stage,
  pub message: String,
  pub statistics: Option<Statistics>,
  pub error: Option<String>,
}
