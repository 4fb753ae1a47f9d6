//! Row <-> Arrow conversion and the CRUD/query surface of the Vector Store.

use arrow_array::{
  Array, BooleanArray, FixedSizeListArray, Float32Array, Float64Array, Int64Array, RecordBatch, RecordBatchIterator,
  StringArray, UInt32Array,
};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use sleuth_core::{CollectionKind, Direction, MetadataValue};
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::Store;
use crate::error::{Result, StoreError};
use crate::row::{QueryMode, Row, ScoredRow};
use crate::schema::schema_for_kind;

fn meta_text(meta: &HashMap<String, MetadataValue>, key: &str) -> Option<String> {
  match meta.get(key) {
    Some(MetadataValue::Text(s)) => Some(s.clone()),
    _ => None,
  }
}

fn meta_text_required(meta: &HashMap<String, MetadataValue>, key: &str) -> Result<String> {
  meta_text(meta, key).ok_or_else(|| StoreError::CorruptRow(format!("missing required metadata field '{key}'")))
}

fn meta_f64(meta: &HashMap<String, MetadataValue>, key: &str) -> Option<f64> {
  match meta.get(key) {
    Some(MetadataValue::Number(n)) => Some(*n),
    _ => None,
  }
}

fn meta_i64(meta: &HashMap<String, MetadataValue>, key: &str) -> Option<i64> {
  meta_f64(meta, key).map(|n| n as i64)
}

fn meta_bool(meta: &HashMap<String, MetadataValue>, key: &str) -> bool {
  matches!(meta.get(key), Some(MetadataValue::Bool(true)))
}

fn to_vector_array(vectors: &[Vec<f32>], dim: usize) -> Result<FixedSizeListArray> {
  let mut flat = Vec::with_capacity(vectors.len() * dim);
  for v in vectors {
    if v.len() != dim {
      return Err(StoreError::CorruptRow(format!("vector has dimension {}, expected {}", v.len(), dim)));
    }
    flat.extend_from_slice(v);
  }
  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  Ok(FixedSizeListArray::try_new(field, dim as i32, Arc::new(Float32Array::from(flat)), None)?)
}

fn rows_to_batch(kind: CollectionKind, rows: &[Row], dim: usize) -> Result<RecordBatch> {
  let ids = StringArray::from(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>());
  let documents = StringArray::from(rows.iter().map(|r| r.document.as_str()).collect::<Vec<_>>());
  let vectors = to_vector_array(&rows.iter().map(|r| r.vector.clone()).collect::<Vec<_>>(), dim)?;

  let columns: Vec<Arc<dyn Array>> = match kind {
    CollectionKind::Messages => {
      let timestamp = Int64Array::from(rows.iter().map(|r| meta_i64(&r.metadata, "timestamp")).collect::<Vec<_>>());
      let contact = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "contact")).collect::<Result<Vec<_>>>()?,
      );
      let contact_name = StringArray::from(rows.iter().map(|r| meta_text(&r.metadata, "contact_name")).collect::<Vec<_>>());
      let direction = StringArray::from(
        rows
          .iter()
          .map(|r| meta_text(&r.metadata, "direction").unwrap_or_else(|| Direction::Unknown.to_string()))
          .collect::<Vec<_>>(),
      );
      let app = StringArray::from(rows.iter().map(|r| meta_text(&r.metadata, "app")).collect::<Vec<_>>());
      let gps_lat = Float64Array::from(rows.iter().map(|r| meta_f64(&r.metadata, "gps_lat")).collect::<Vec<_>>());
      let gps_lon = Float64Array::from(rows.iter().map(|r| meta_f64(&r.metadata, "gps_lon")).collect::<Vec<_>>());
      let is_noise = BooleanArray::from(rows.iter().map(|r| meta_bool(&r.metadata, "is_noise")).collect::<Vec<_>>());
      let source_tag = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "source_tag")).collect::<Result<Vec<_>>>()?,
      );
      vec![
        Arc::new(ids),
        Arc::new(documents),
        Arc::new(timestamp),
        Arc::new(contact),
        Arc::new(contact_name),
        Arc::new(direction),
        Arc::new(app),
        Arc::new(gps_lat),
        Arc::new(gps_lon),
        Arc::new(is_noise),
        Arc::new(source_tag),
        Arc::new(vectors),
      ]
    }
    CollectionKind::Chunks => {
      let timestamp_start =
        Int64Array::from(rows.iter().map(|r| meta_i64(&r.metadata, "timestamp_start")).collect::<Vec<_>>());
      let timestamp_end =
        Int64Array::from(rows.iter().map(|r| meta_i64(&r.metadata, "timestamp_end")).collect::<Vec<_>>());
      let contact = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "contact")).collect::<Result<Vec<_>>>()?,
      );
      let contact_name = StringArray::from(rows.iter().map(|r| meta_text(&r.metadata, "contact_name")).collect::<Vec<_>>());
      let member_ids = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "member_ids")).collect::<Result<Vec<_>>>()?,
      );
      let first_message_id = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "first_message_id")).collect::<Result<Vec<_>>>()?,
      );
      let member_count = UInt32Array::from(
        rows.iter().map(|r| meta_i64(&r.metadata, "member_count").unwrap_or(0) as u32).collect::<Vec<_>>(),
      );
      let is_noise = BooleanArray::from(rows.iter().map(|r| meta_bool(&r.metadata, "is_noise")).collect::<Vec<_>>());
      vec![
        Arc::new(ids),
        Arc::new(documents),
        Arc::new(timestamp_start),
        Arc::new(timestamp_end),
        Arc::new(contact),
        Arc::new(contact_name),
        Arc::new(member_ids),
        Arc::new(first_message_id),
        Arc::new(member_count),
        Arc::new(is_noise),
        Arc::new(vectors),
      ]
    }
    CollectionKind::Images => {
      let filename = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "filename")).collect::<Result<Vec<_>>>()?,
      );
      let path = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "path")).collect::<Result<Vec<_>>>()?,
      );
      let timestamp = Int64Array::from(rows.iter().map(|r| meta_i64(&r.metadata, "timestamp")).collect::<Vec<_>>());
      let gps_lat = Float64Array::from(rows.iter().map(|r| meta_f64(&r.metadata, "gps_lat")).collect::<Vec<_>>());
      let gps_lon = Float64Array::from(rows.iter().map(|r| meta_f64(&r.metadata, "gps_lon")).collect::<Vec<_>>());
      let source_tag = StringArray::from(
        rows.iter().map(|r| meta_text_required(&r.metadata, "source_tag")).collect::<Result<Vec<_>>>()?,
      );
      vec![
        Arc::new(ids),
        Arc::new(documents),
        Arc::new(filename),
        Arc::new(path),
        Arc::new(timestamp),
        Arc::new(gps_lat),
        Arc::new(gps_lon),
        Arc::new(source_tag),
        Arc::new(vectors),
      ]
    }
  };

  Ok(RecordBatch::try_new(schema_for_kind(kind, dim), columns)?)
}

fn get_string(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .filter(|a| !a.is_null(row))
    .map(|a| a.value(row).to_string())
    .ok_or_else(|| StoreError::CorruptRow(name.to_string()))
}

fn get_opt_string(batch: &RecordBatch, name: &str, row: usize) -> Option<String> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .filter(|a| !a.is_null(row))
    .map(|a| a.value(row).to_string())
}

fn get_opt_i64(batch: &RecordBatch, name: &str, row: usize) -> Option<i64> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
    .filter(|a| !a.is_null(row))
    .map(|a| a.value(row))
}

fn get_opt_f64(batch: &RecordBatch, name: &str, row: usize) -> Option<f64> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
    .filter(|a| !a.is_null(row))
    .map(|a| a.value(row))
}

fn get_u32(batch: &RecordBatch, name: &str, row: usize) -> Result<u32> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
    .map(|a| a.value(row))
    .ok_or_else(|| StoreError::CorruptRow(name.to_string()))
}

fn get_bool(batch: &RecordBatch, name: &str, row: usize) -> Result<bool> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
    .map(|a| a.value(row))
    .ok_or_else(|| StoreError::CorruptRow(name.to_string()))
}

fn batch_to_row(kind: CollectionKind, batch: &RecordBatch, row: usize) -> Result<Row> {
  let id = get_string(batch, "id", row)?;
  let document = get_string(batch, "document", row)?;

  let mut metadata = HashMap::new();
  match kind {
    CollectionKind::Messages => {
      if let Some(ts) = get_opt_i64(batch, "timestamp", row) {
        metadata.insert("timestamp".to_string(), MetadataValue::Number(ts as f64));
      }
      metadata.insert("contact".to_string(), MetadataValue::Text(get_string(batch, "contact", row)?));
      if let Some(name) = get_opt_string(batch, "contact_name", row) {
        metadata.insert("contact_name".to_string(), MetadataValue::Text(name));
      }
      metadata.insert("direction".to_string(), MetadataValue::Text(get_string(batch, "direction", row)?));
      if let Some(app) = get_opt_string(batch, "app", row) {
        metadata.insert("app".to_string(), MetadataValue::Text(app));
      }
      if let Some(lat) = get_opt_f64(batch, "gps_lat", row) {
        metadata.insert("gps_lat".to_string(), MetadataValue::Number(lat));
      }
      if let Some(lon) = get_opt_f64(batch, "gps_lon", row) {
        metadata.insert("gps_lon".to_string(), MetadataValue::Number(lon));
      }
      metadata.insert("is_noise".to_string(), MetadataValue::Bool(get_bool(batch, "is_noise", row)?));
      metadata.insert("source_tag".to_string(), MetadataValue::Text(get_string(batch, "source_tag", row)?));
    }
    CollectionKind::Chunks => {
      if let Some(ts) = get_opt_i64(batch, "timestamp_start", row) {
        metadata.insert("timestamp_start".to_string(), MetadataValue::Number(ts as f64));
      }
      if let Some(ts) = get_opt_i64(batch, "timestamp_end", row) {
        metadata.insert("timestamp_end".to_string(), MetadataValue::Number(ts as f64));
      }
      metadata.insert("contact".to_string(), MetadataValue::Text(get_string(batch, "contact", row)?));
      if let Some(name) = get_opt_string(batch, "contact_name", row) {
        metadata.insert("contact_name".to_string(), MetadataValue::Text(name));
      }
      metadata.insert("member_ids".to_string(), MetadataValue::Text(get_string(batch, "member_ids", row)?));
      metadata
        .insert("first_message_id".to_string(), MetadataValue::Text(get_string(batch, "first_message_id", row)?));
      metadata.insert("member_count".to_string(), MetadataValue::Number(get_u32(batch, "member_count", row)? as f64));
      metadata.insert("is_noise".to_string(), MetadataValue::Bool(get_bool(batch, "is_noise", row)?));
    }
    CollectionKind::Images => {
      metadata.insert("filename".to_string(), MetadataValue::Text(get_string(batch, "filename", row)?));
      metadata.insert("path".to_string(), MetadataValue::Text(get_string(batch, "path", row)?));
      if let Some(ts) = get_opt_i64(batch, "timestamp", row) {
        metadata.insert("timestamp".to_string(), MetadataValue::Number(ts as f64));
      }
      if let Some(lat) = get_opt_f64(batch, "gps_lat", row) {
        metadata.insert("gps_lat".to_string(), MetadataValue::Number(lat));
      }
      if let Some(lon) = get_opt_f64(batch, "gps_lon", row) {
        metadata.insert("gps_lon".to_string(), MetadataValue::Number(lon));
      }
      metadata.insert("source_tag".to_string(), MetadataValue::Text(get_string(batch, "source_tag", row)?));
    }
  }

  let vector = batch
    .column_by_name("vector")
    .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
    .map(|a| {
      let values = a.value(row);
      let floats = values.as_any().downcast_ref::<Float32Array>().expect("vector column is Float32");
      floats.values().to_vec()
    })
    .ok_or_else(|| StoreError::CorruptRow("vector".into()))?;

  Ok(Row { id, document, metadata, vector })
}

/// Cosine distance between two equal-length vectors, `1 - cosine_similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm_a == 0.0 || norm_b == 0.0 {
    return 1.0;
  }
  1.0 - (dot / (norm_a * norm_b))
}

impl Store {
  /// Write a batch atomically: last-writer-wins on id collisions within the
  /// batch, delete-then-add against any pre-existing ids.
  pub async fn upsert(&self, name: &str, rows: Vec<Row>) -> Result<()> {
    if rows.is_empty() {
      return Ok(());
    }

    let lock = self.collection_lock(name).await;
    let _guard = lock.read().await;

    let (kind, dim) = self.kind_and_dim(name).await?;
    let table = self.open_collection(name).await?;

    // last-writer-wins within the batch
    let mut by_id: HashMap<String, Row> = HashMap::new();
    for row in rows {
      by_id.insert(row.id.clone(), row);
    }
    let rows: Vec<Row> = by_id.into_values().collect();

    let id_list = rows.iter().map(|r| format!("'{}'", r.id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
    table.delete(&format!("id IN ({id_list})")).await?;

    let batch = rows_to_batch(kind, &rows, dim)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], schema_for_kind(kind, dim));
    table.add(Box::new(batches)).execute().await?;
    Ok(())
  }

  /// Fetch one row by id.
  pub async fn get_by_id(&self, name: &str, id: &str) -> Result<Option<Row>> {
    let lock = self.collection_lock(name).await;
    let _guard = lock.read().await;

    let kind = self.kind_of(name).await?;
    let table = self.open_collection(name).await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("id = '{}'", id.replace('\'', "''")))
      .execute()
      .await?
      .try_collect()
      .await?;

    for batch in &results {
      if batch.num_rows() > 0 {
        return Ok(Some(batch_to_row(kind, batch, 0)?));
      }
    }
    Ok(None)
  }

  /// Metadata-only scan; no vector search.
  pub async fn scan(&self, name: &str, predicate: Option<&str>, limit: Option<usize>) -> Result<Vec<Row>> {
    let lock = self.collection_lock(name).await;
    let _guard = lock.read().await;

    let kind = self.kind_of(name).await?;
    let table = self.open_collection(name).await?;

    let query = match (predicate, limit) {
      (Some(p), Some(l)) => table.query().only_if(p).limit(l),
      (Some(p), None) => table.query().only_if(p),
      (None, Some(l)) => table.query().limit(l),
      (None, None) => table.query(),
    };

    let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;
    let mut rows = Vec::new();
    for batch in &results {
      for i in 0..batch.num_rows() {
        rows.push(batch_to_row(kind, batch, i)?);
      }
    }
    Ok(rows)
  }

  /// Vector query. `ANN` uses LanceDB's native index; `KNN` is an exhaustive,
  /// index-free exact scan over every row matching the predicate.
  pub async fn query(
    &self,
    name: &str,
    qvec: &[f32],
    k: usize,
    predicate: Option<&str>,
    mode: QueryMode,
  ) -> Result<Vec<ScoredRow>> {
    let lock = self.collection_lock(name).await;
    let _guard = lock.read().await;

    let kind = self.kind_of(name).await?;
    let table = self.open_collection(name).await?;

    match mode {
      QueryMode::Ann => {
        let query = match predicate {
          Some(p) => table.vector_search(qvec.to_vec())?.limit(k).only_if(p),
          None => table.vector_search(qvec.to_vec())?.limit(k),
        };
        let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;
        let mut scored = Vec::new();
        for batch in &results {
          for i in 0..batch.num_rows() {
            let row = batch_to_row(kind, batch, i)?;
            let distance = batch
              .column_by_name("_distance")
              .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
              .map(|a| a.value(i))
              .unwrap_or(0.0);
            scored.push(ScoredRow { row, distance });
          }
        }
        Ok(scored)
      }
      QueryMode::Knn => {
        let candidates = self.scan(name, predicate, None).await?;
        let mut scored: Vec<ScoredRow> = candidates
          .into_iter()
          .map(|row| {
            let distance = cosine_distance(qvec, &row.vector);
            ScoredRow { row, distance }
          })
          .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::Store;
  use tempfile::TempDir;

  fn message_row(id: &str, contact: &str, vector: Vec<f32>) -> Row {
    let mut metadata = HashMap::new();
    metadata.insert("contact".to_string(), MetadataValue::Text(contact.to_string()));
    metadata.insert("direction".to_string(), MetadataValue::Text("incoming".to_string()));
    metadata.insert("is_noise".to_string(), MetadataValue::Bool(false));
    metadata.insert("source_tag".to_string(), MetadataValue::Text("batch1".to_string()));
    Row { id: id.to_string(), document: format!("text for {id}"), metadata, vector }
  }

  async fn test_store() -> (TempDir, Store) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).await.unwrap();
    (temp, store)
  }

  #[tokio::test]
  async fn upsert_then_get_by_id_round_trips() {
    let (_temp, store) = test_store().await;
    store.create_collection("messages_t1", CollectionKind::Messages, 4, "model").await.unwrap();

    let row = message_row("m1", "alice", vec![1.0, 0.0, 0.0, 0.0]);
    store.upsert("messages_t1", vec![row.clone()]).await.unwrap();

    let fetched = store.get_by_id("messages_t1", "m1").await.unwrap().unwrap();
    assert_eq!(fetched.id, "m1");
    assert_eq!(fetched.document, row.document);
  }

  #[tokio::test]
  async fn upsert_is_idempotent() {
    let (_temp, store) = test_store().await;
    store.create_collection("messages_t1", CollectionKind::Messages, 4, "model").await.unwrap();

    let row = message_row("m1", "alice", vec![1.0, 0.0, 0.0, 0.0]);
    store.upsert("messages_t1", vec![row.clone()]).await.unwrap();
    store.upsert("messages_t1", vec![row]).await.unwrap();

    assert_eq!(store.count("messages_t1").await.unwrap(), 1);
  }

  #[tokio::test]
  async fn knn_returns_exact_cosine_order() {
    let (_temp, store) = test_store().await;
    store.create_collection("messages_t1", CollectionKind::Messages, 2, "model").await.unwrap();

    store
      .upsert(
        "messages_t1",
        vec![message_row("a", "alice", vec![1.0, 0.0]), message_row("b", "alice", vec![0.0, 1.0])],
      )
      .await
      .unwrap();

    let results = store.query("messages_t1", &[1.0, 0.0], 2, None, QueryMode::Knn).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].row.id, "a");
    assert!((results[0].distance - 0.0).abs() < 1e-6);
    assert!((results[1].distance - 1.0).abs() < 1e-6);
  }

  #[tokio::test]
  async fn scan_applies_predicate() {
    let (_temp, store) = test_store().await;
    store.create_collection("messages_t1", CollectionKind::Messages, 2, "model").await.unwrap();
    store
      .upsert(
        "messages_t1",
        vec![message_row("a", "alice", vec![1.0, 0.0]), message_row("b", "bob", vec![0.0, 1.0])],
      )
      .await
      .unwrap();

    let rows = store.scan("messages_t1", Some("contact = 'alice'"), None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "a");
  }

  #[test]
  fn cosine_distance_of_identical_vectors_is_zero() {
    assert!(cosine_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).abs() < 1e-6);
  }

  #[test]
  fn cosine_distance_of_orthogonal_vectors_is_one() {
    assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
  }
}
