//! Chunker: slides overlapping context windows over each contact's messages,
//! sorted ascending, so nearby messages are indexed together as one document.

use sleuth_core::{ChunkConfig, ContextChunk, Message, sort_by_timestamp_then_id};
use std::collections::BTreeMap;

/// Builds [`ContextChunk`]s from a flat batch of messages spanning any number
/// of contacts, per the sliding-window algorithm of the Chunker component.
pub struct Chunker {
  config: ChunkConfig,
}

impl Chunker {
  pub fn new(config: ChunkConfig) -> Self {
    Self { config }
  }

  /// Partition `messages` by contact, sort each partition by `(timestamp, id)`,
  /// and slide a `window_size`-wide, `overlap`-overlapping window over each to
  /// produce one `ContextChunk` per window.
  pub fn chunk(&self, messages: &[Message]) -> Vec<ContextChunk> {
    let window_size = self.config.window_size.max(1);
    let overlap = self.config.overlap.min(window_size.saturating_sub(1));
    let stride = window_size - overlap;

    let mut by_contact: BTreeMap<&str, Vec<&Message>> = BTreeMap::new();
    for message in messages {
      by_contact.entry(message.contact.as_str()).or_default().push(message);
    }

    let mut chunks = Vec::new();
    for group in by_contact.values_mut() {
      sort_by_timestamp_then_id(group, |m| m.timestamp, |m| m.id.as_str());
      chunks.extend(Self::window(group, window_size, stride));
    }
    chunks
  }

  fn window(members: &[&Message], window_size: usize, stride: usize) -> Vec<ContextChunk> {
    let len = members.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut prev_highest: Option<usize> = None;

    while start < len {
      let end = (start + window_size).min(len);
      let highest = end - 1;
      if let Some(prev) = prev_highest
        && highest <= prev
      {
        break;
      }

      chunks.push(Self::build_chunk(&members[start..end]));
      prev_highest = Some(highest);

      if end == len {
        break;
      }
      start += stride;
    }

    chunks
  }

  fn build_chunk(window: &[&Message]) -> ContextChunk {
    let first = window[0];
    let text = window.iter().map(|m| m.text.as_str()).collect::<Vec<_>>().join("\n");
    let member_ids: Vec<String> = window.iter().map(|m| m.id.clone()).collect();
    let timestamps: Vec<i64> = window.iter().filter_map(|m| m.timestamp).collect();
    let (timestamp_start, timestamp_end) = if timestamps.is_empty() {
      (None, None)
    } else {
      (timestamps.iter().min().copied(), timestamps.iter().max().copied())
    };
    let contact_name = window.iter().find_map(|m| m.contact_name.clone());
    let is_noise = window.iter().all(|m| m.is_noise);
    let member_count = window.len();

    ContextChunk {
      id: ContextChunk::derive_id(&first.contact, &first.id, member_count),
      text,
      timestamp_start,
      timestamp_end,
      contact: first.contact.clone(),
      contact_name,
      member_ids,
      first_message_id: first.id.clone(),
      member_count,
      is_noise,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sleuth_core::Direction;

  fn msg(id: &str, contact: &str, ts: Option<i64>, noise: bool) -> Message {
    Message {
      id: id.to_string(),
      text: format!("text-{id}"),
      timestamp: ts,
      contact: contact.to_string(),
      contact_name: None,
      direction: Direction::Incoming,
      app: None,
      gps_lat: None,
      gps_lon: None,
      is_noise: noise,
      source_tag: "batch1".to_string(),
    }
  }

  #[test]
  fn single_message_contact_yields_one_chunk_of_size_one() {
    let messages = vec![msg("m1", "alice", Some(1), false)];
    let chunker = Chunker::new(ChunkConfig { window_size: 5, overlap: 2 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].member_count, 1);
  }

  #[test]
  fn window_size_one_overlap_zero_produces_one_chunk_per_message() {
    let messages = vec![
      msg("m1", "alice", Some(1), false),
      msg("m2", "alice", Some(2), false),
      msg("m3", "alice", Some(3), false),
    ];
    let chunker = Chunker::new(ChunkConfig { window_size: 1, overlap: 0 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
      assert_eq!(chunk.member_count, 1);
    }
  }

  #[test]
  fn max_overlap_slides_by_one_with_no_trailing_duplicate() {
    // window=3, overlap=2 -> stride=1, 7 messages -> 5 full windows, no trailing partial.
    let messages: Vec<Message> = (0..7).map(|i| msg(&format!("m{i}"), "alice", Some(i as i64), false)).collect();
    let chunker = Chunker::new(ChunkConfig { window_size: 3, overlap: 2 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks.len(), 5);
    for chunk in &chunks {
      assert_eq!(chunk.member_count, 3);
    }
  }

  #[test]
  fn trailing_partial_window_emitted_when_not_evenly_divided() {
    // window=3, overlap=1 -> stride=2, 8 messages -> windows at 0,2,4,6; the
    // last window only has messages 6-7 (size 2) since the stream ends there.
    let messages: Vec<Message> = (0..8).map(|i| msg(&format!("m{i}"), "alice", Some(i as i64), false)).collect();
    let chunker = Chunker::new(ChunkConfig { window_size: 3, overlap: 1 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks.last().unwrap().member_count, 2);
  }

  #[test]
  fn chunks_never_cross_contacts() {
    let messages =
      vec![msg("m1", "alice", Some(1), false), msg("m2", "bob", Some(2), false), msg("m3", "alice", Some(3), false)];
    let chunker = Chunker::new(ChunkConfig { window_size: 5, overlap: 0 });
    let chunks = chunker.chunk(&messages);
    for chunk in &chunks {
      assert!(chunk.member_ids.iter().all(|id| {
        let contact = messages.iter().find(|m| &m.id == id).unwrap().contact.as_str();
        contact == chunk.contact
      }));
    }
  }

  #[test]
  fn every_message_is_covered_by_some_chunk() {
    let messages: Vec<Message> = (0..10).map(|i| msg(&format!("m{i}"), "alice", Some(i as i64), false)).collect();
    let chunker = Chunker::new(ChunkConfig { window_size: 4, overlap: 1 });
    let chunks = chunker.chunk(&messages);
    for message in &messages {
      assert!(chunks.iter().any(|c| c.member_ids.contains(&message.id)));
    }
  }

  #[test]
  fn chunk_id_matches_derived_formula() {
    let messages = vec![msg("m1", "alice", Some(1), false), msg("m2", "alice", Some(2), false)];
    let chunker = Chunker::new(ChunkConfig { window_size: 2, overlap: 0 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks[0].id, "alice:m1:2");
  }

  #[test]
  fn chunk_is_noise_is_conjunction_of_members() {
    let messages = vec![msg("m1", "alice", Some(1), true), msg("m2", "alice", Some(2), false)];
    let chunker = Chunker::new(ChunkConfig { window_size: 2, overlap: 0 });
    let chunks = chunker.chunk(&messages);
    assert!(!chunks[0].is_noise);

    let all_noise = vec![msg("m1", "alice", Some(1), true), msg("m2", "alice", Some(2), true)];
    let chunks = chunker.chunk(&all_noise);
    assert!(chunks[0].is_noise);
  }

  #[test]
  fn chunk_with_no_timestamps_has_null_start_and_end() {
    let messages = vec![msg("m1", "alice", None, false), msg("m2", "alice", None, false)];
    let chunker = Chunker::new(ChunkConfig { window_size: 2, overlap: 0 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks[0].timestamp_start, None);
    assert_eq!(chunks[0].timestamp_end, None);
  }

  #[test]
  fn text_is_newline_joined_in_window_order() {
    let messages = vec![msg("m1", "alice", Some(1), false), msg("m2", "alice", Some(2), false)];
    let chunker = Chunker::new(ChunkConfig { window_size: 2, overlap: 0 });
    let chunks = chunker.chunk(&messages);
    assert_eq!(chunks[0].text, "text-m1\ntext-m2");
  }
}
