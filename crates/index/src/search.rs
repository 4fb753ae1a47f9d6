//! Search Engine: encode → filter → retrieve → post-filter → score → rank,
//! plus conversation reconstruction around a target row.

use crate::filter::{QueryPredicate, compile, haversine_km};
use futures::future::join_all;
use sleuth_core::{Error, MetadataValue, Result, by_timestamp_then_id};
use sleuth_embedding::EmbeddingProvider;
use sleuth_store::{QueryMode, Row, ScoredRow, Store};
use std::sync::Arc;

/// One search request against a single collection.
#[derive(Debug, Clone)]
pub struct SearchRequest {
  pub collection: String,
  pub query_text: String,
  pub k: usize,
  pub predicate: QueryPredicate,
  pub mode: QueryMode,
  pub distance_ceiling: Option<f32>,
  pub geo_over_retrieval_multiplier: f32,
}

/// A row scored and attributed to the collection it came from, for
/// multi-collection merges.
#[derive(Debug, Clone)]
pub struct ScoredResult {
  pub row: Row,
  pub distance: f32,
  pub score: f32,
  pub collection: String,
}

/// A target row and its `(timestamp, id)`-ordered neighbors in the same contact.
#[derive(Debug, Clone)]
pub struct Conversation {
  pub target: Row,
  pub before: Vec<Row>,
  pub after: Vec<Row>,
}

pub struct SearchEngine {
  store: Arc<Store>,
  embedder: Arc<dyn EmbeddingProvider>,
}

impl SearchEngine {
  pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
    Self { store, embedder }
  }

  /// Run the seven-step search algorithm against one collection.
  pub async fn search(&self, request: SearchRequest) -> Result<Vec<ScoredResult>> {
    let query_vector = self.embedder.embed(&request.query_text).await?;
    let filter = compile(&request.predicate)?;
    let has_geo = request.predicate.radius_km.is_some();
    let retrieve_k = over_retrieval_k(request.k, has_geo, request.geo_over_retrieval_multiplier);

    let scored =
      self.store.query(&request.collection, &query_vector, retrieve_k, filter.as_deref(), request.mode).await?;

    let mut results = apply_geo_postfilter(scored, &request.predicate, &request.collection);
    score_and_clamp(&mut results);
    apply_distance_ceiling(&mut results, request.distance_ceiling);
    tie_break_sort(&mut results);
    results.truncate(request.k);
    Ok(results)
  }

  /// Run `search` once per request concurrently and merge by descending
  /// score, then ascending `(collection, id)`.
  pub async fn search_many(&self, requests: Vec<SearchRequest>) -> Result<Vec<ScoredResult>> {
    let outcomes = join_all(requests.into_iter().map(|request| self.search(request))).await;
    let mut merged = Vec::new();
    for outcome in outcomes {
      merged.extend(outcome?);
    }
    tie_break_sort(&mut merged);
    Ok(merged)
  }

  /// Reconstruct the conversation around `message_id`: up to `before` rows
  /// preceding it and up to `after` rows following it, in the same contact,
  /// ordered by `(timestamp, id)`.
  pub async fn reconstruct(&self, collection: &str, message_id: &str, before: usize, after: usize) -> Result<Conversation> {
    let target = self
      .store
      .get_by_id(collection, message_id)
      .await?
      .ok_or_else(|| Error::NotFound { entity: "row", id: message_id.to_string() })?;

    let contact = meta_text(&target.metadata, "contact")
      .ok_or_else(|| Error::CorruptIndex("row missing contact metadata".to_string()))?;
    let predicate = format!("contact = '{}'", contact.replace('\'', "''"));

    let mut rows = self.store.scan(collection, Some(&predicate), None).await?;
    sort_rows(&mut rows);

    let idx = rows
      .iter()
      .position(|row| row.id == target.id)
      .ok_or_else(|| Error::NotFound { entity: "row", id: message_id.to_string() })?;

    let before_rows = rows[idx.saturating_sub(before)..idx].to_vec();
    let after_end = (idx + 1 + after).min(rows.len());
    let after_rows = rows[idx + 1..after_end].to_vec();

    Ok(Conversation { target, before: before_rows, after: after_rows })
  }
}

fn over_retrieval_k(k: usize, has_geo_postfilter: bool, multiplier: f32) -> usize {
  if !has_geo_postfilter {
    return k;
  }
  let by_multiplier = (multiplier * k as f32).ceil() as usize;
  by_multiplier.max(k + 20)
}

fn apply_geo_postfilter(scored: Vec<ScoredRow>, predicate: &QueryPredicate, collection: &str) -> Vec<ScoredResult> {
  let geo = match (predicate.gps_lat, predicate.gps_lon, predicate.radius_km) {
    (Some(lat), Some(lon), Some(radius_km)) => Some((lat, lon, radius_km)),
    _ => None,
  };

  scored
    .into_iter()
    .filter_map(|scored_row| {
      if let Some((lat, lon, radius_km)) = geo {
        let row_lat = meta_f64(&scored_row.row.metadata, "gps_lat");
        let row_lon = meta_f64(&scored_row.row.metadata, "gps_lon");
        match (row_lat, row_lon) {
          (Some(row_lat), Some(row_lon)) => {
            if haversine_km(lat, lon, row_lat, row_lon) > radius_km {
              return None;
            }
          }
          _ => return None,
        }
      }
      Some(ScoredResult { row: scored_row.row, distance: scored_row.distance, score: 0.0, collection: collection.to_string() })
    })
    .collect()
}

fn score_and_clamp(results: &mut [ScoredResult]) {
  for result in results {
    result.score = (1.0 - result.distance).clamp(0.0, 1.0);
  }
}

fn apply_distance_ceiling(results: &mut Vec<ScoredResult>, ceiling: Option<f32>) {
  if let Some(ceiling) = ceiling {
    results.retain(|r| r.distance <= ceiling);
  }
}

fn tie_break_sort(results: &mut [ScoredResult]) {
  results.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.collection.cmp(&b.collection))
      .then_with(|| a.row.id.cmp(&b.row.id))
  });
}

fn sort_rows(rows: &mut [Row]) {
  rows.sort_by(|a, b| {
    by_timestamp_then_id(meta_i64(&a.metadata, "timestamp"), &a.id, meta_i64(&b.metadata, "timestamp"), &b.id)
  });
}

fn meta_text(metadata: &std::collections::HashMap<String, MetadataValue>, key: &str) -> Option<String> {
  match metadata.get(key) {
    Some(MetadataValue::Text(s)) => Some(s.clone()),
    _ => None,
  }
}

fn meta_f64(metadata: &std::collections::HashMap<String, MetadataValue>, key: &str) -> Option<f64> {
  match metadata.get(key) {
    Some(MetadataValue::Number(n)) => Some(*n),
    _ => None,
  }
}

fn meta_i64(metadata: &std::collections::HashMap<String, MetadataValue>, key: &str) -> Option<i64> {
  meta_f64(metadata, key).map(|n| n as i64)
}
