//! The single `(timestamp, id)` ordering used by both the chunker and conversation
//! reconstruction, so the two call sites can never drift apart on tie-break rules.

use std::cmp::Ordering;

/// Ascending comparator: order by `timestamp` when both are present, falling back
/// to ascending `id` when timestamps are equal, missing, or both null.
///
/// Rows with a null timestamp sort after every row with a timestamp, and among
/// themselves sort by `id` ascending, giving a stable order even for sources
/// with gapless or missing clock data.
pub fn by_timestamp_then_id(a_timestamp: Option<i64>, a_id: &str, b_timestamp: Option<i64>, b_id: &str) -> Ordering {
  match (a_timestamp, b_timestamp) {
    (Some(at), Some(bt)) => at.cmp(&bt).then_with(|| a_id.cmp(b_id)),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => a_id.cmp(b_id),
  }
}

/// Sort a slice of `(timestamp, id)`-bearing items in place using [`by_timestamp_then_id`].
pub fn sort_by_timestamp_then_id<T>(items: &mut [T], timestamp: impl Fn(&T) -> Option<i64>, id: impl Fn(&T) -> &str) {
  items.sort_by(|a, b| by_timestamp_then_id(timestamp(a), id(a), timestamp(b), id(b)));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn orders_by_timestamp_first() {
    assert_eq!(by_timestamp_then_id(Some(1), "b", Some(2), "a"), Ordering::Less);
  }

  #[test]
  fn breaks_ties_by_id() {
    assert_eq!(by_timestamp_then_id(Some(5), "a", Some(5), "b"), Ordering::Less);
    assert_eq!(by_timestamp_then_id(Some(5), "b", Some(5), "a"), Ordering::Greater);
  }

  #[test]
  fn null_timestamp_sorts_after_present_timestamp() {
    assert_eq!(by_timestamp_then_id(None, "a", Some(1), "z"), Ordering::Greater);
    assert_eq!(by_timestamp_then_id(Some(1), "z", None, "a"), Ordering::Less);
  }

  #[test]
  fn both_null_falls_back_to_id() {
    assert_eq!(by_timestamp_then_id(None, "a", None, "b"), Ordering::Less);
  }

  #[test]
  fn sort_helper_produces_stable_ascending_order() {
    let mut items = vec![("m3", Some(30)), ("m1", None), ("m2", Some(20)), ("m0", None)];
    sort_by_timestamp_then_id(&mut items, |(_, ts)| *ts, |(id, _)| id);
    let ids: Vec<&str> = items.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec!["m2", "m3", "m0", "m1"]);
  }
}
