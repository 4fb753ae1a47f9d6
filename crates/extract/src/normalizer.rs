//! Record Normalizer: turns whatever the out-of-scope tabular parsers hand us
//! into the one typed record shape the rest of the pipeline consumes.
//!
//! Malformed rows are skipped, counted, and logged — never raised to the caller.

use serde_json::Value;
use sleuth_core::{Direction, ImageRecord, Message};
use std::collections::HashMap;
use tracing::warn;

/// A single raw row handed in by a parser: a loosely typed field bag. Parsers
/// are free to use whatever field names their source format has; the
/// normalizer only ever reaches for the handful documented in §6.1.
pub type RawRow = HashMap<String, Value>;

/// Counts accumulated while normalizing one batch of raw rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
  pub parsed: usize,
  pub skipped: usize,
}

/// Normalize a batch of raw rows into `Message`s. Rows missing a `text` or
/// `contact` field are skipped and counted rather than raising.
pub fn normalize_messages(rows: impl IntoIterator<Item = RawRow>, source_tag: &str) -> (Vec<Message>, NormalizeStats) {
  let mut messages = Vec::new();
  let mut stats = NormalizeStats::default();

  for (index, row) in rows.into_iter().enumerate() {
    match normalize_one_message(&row, source_tag) {
      Some(message) => {
        messages.push(message);
        stats.parsed += 1;
      }
      None => {
        warn!(row_index = index, "skipping malformed message row");
        stats.skipped += 1;
      }
    }
  }

  (messages, stats)
}

/// Normalize a batch of raw rows into `ImageRecord`s. Rows missing `filename`
/// or `path` are skipped and counted.
pub fn normalize_images(rows: impl IntoIterator<Item = RawRow>, source_tag: &str) -> (Vec<ImageRecord>, NormalizeStats) {
  let mut images = Vec::new();
  let mut stats = NormalizeStats::default();

  for (index, row) in rows.into_iter().enumerate() {
    match normalize_one_image(&row, source_tag) {
      Some(image) => {
        images.push(image);
        stats.parsed += 1;
      }
      None => {
        warn!(row_index = index, "skipping malformed image row");
        stats.skipped += 1;
      }
    }
  }

  (images, stats)
}

fn normalize_one_message(row: &RawRow, source_tag: &str) -> Option<Message> {
  let id = string_field(row, "id").unwrap_or_else(|| generate_row_id(row));
  let text = string_field(row, "text")?;
  let contact = string_field(row, "contact")?;

  Some(Message {
    id,
    text,
    timestamp: row.get("timestamp").and_then(parse_timestamp),
    contact,
    contact_name: string_field(row, "contact_name"),
    direction: parse_direction(row.get("direction")),
    app: string_field(row, "app"),
    gps_lat: row.get("gps_lat").and_then(Value::as_f64),
    gps_lon: row.get("gps_lon").and_then(Value::as_f64),
    is_noise: false,
    source_tag: source_tag.to_string(),
  })
}

fn normalize_one_image(row: &RawRow, source_tag: &str) -> Option<ImageRecord> {
  let id = string_field(row, "id").unwrap_or_else(|| generate_row_id(row));
  let filename = string_field(row, "filename")?;
  let path = string_field(row, "path")?;

  Some(ImageRecord {
    id,
    description: string_field(row, "description").unwrap_or_default(),
    filename,
    path,
    timestamp: row.get("timestamp").and_then(parse_timestamp),
    gps_lat: row.get("gps_lat").and_then(Value::as_f64),
    gps_lon: row.get("gps_lon").and_then(Value::as_f64),
    source_tag: source_tag.to_string(),
  })
}

fn string_field(row: &RawRow, key: &str) -> Option<String> {
  match row.get(key)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Rows with no caller-supplied `id` get a stable one derived from their own
/// content hash rather than a random id, so re-normalizing the same source
/// twice yields the same ids (and therefore the same upsert behavior).
fn generate_row_id(row: &RawRow) -> String {
  use std::collections::hash_map::DefaultHasher;
  use std::hash::{Hash, Hasher};

  let mut entries: Vec<(&String, String)> = row.iter().map(|(k, v)| (k, v.to_string())).collect();
  entries.sort_by(|a, b| a.0.cmp(b.0));

  let mut hasher = DefaultHasher::new();
  for (key, value) in entries {
    key.hash(&mut hasher);
    value.hash(&mut hasher);
  }
  format!("row-{:x}", hasher.finish())
}

/// Accepts epoch seconds/millis (as a JSON number) or an ISO-8601 string.
fn parse_timestamp(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => {
      let as_i64 = n.as_i64()?;
      // Heuristic: values under ~13 digits are epoch seconds, not millis.
      if as_i64.abs() < 10_000_000_000 { Some(as_i64 * 1000) } else { Some(as_i64) }
    }
    Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis()),
    _ => None,
  }
}

fn parse_direction(value: Option<&Value>) -> Direction {
  match value.and_then(Value::as_str).map(str::to_lowercase).as_deref() {
    Some("incoming") | Some("in") | Some("received") => Direction::Incoming,
    Some("outgoing") | Some("out") | Some("sent") => Direction::Outgoing,
    _ => Direction::Unknown,
  }
}
