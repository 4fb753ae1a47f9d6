use arrow_array::{Int64Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, connect};
use sleuth_core::{CollectionInfo, CollectionKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::schema::{COLLECTIONS_REGISTRY_TABLE, collections_registry_schema, schema_for_kind};

/// Embedded vector store: one physical LanceDB table per collection, plus a
/// `_collections` registry table recording kind/dimension/model so
/// `list_collections` and dimension-mismatch checks never need to open every
/// table.
pub struct Store {
  pub(crate) connection: Connection,
  pub(crate) storage_root: PathBuf,
  locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl Store {
  /// Open (or create) the store at `storage_root`.
  pub async fn open(storage_root: impl AsRef<Path>) -> Result<Self> {
    let storage_root = storage_root.as_ref().to_path_buf();
    std::fs::create_dir_all(&storage_root)?;

    info!(path = %storage_root.display(), "opening vector store");
    let connection = connect(storage_root.to_string_lossy().as_ref()).execute().await?;

    let store = Self { connection, storage_root, locks: Mutex::new(HashMap::new()) };
    store.ensure_registry().await?;
    Ok(store)
  }

  async fn ensure_registry(&self) -> Result<()> {
    let table_names = self.connection.table_names().execute().await?;
    if !table_names.contains(&COLLECTIONS_REGISTRY_TABLE.to_string()) {
      debug!("creating collections registry table");
      self
        .connection
        .create_empty_table(COLLECTIONS_REGISTRY_TABLE, collections_registry_schema())
        .execute()
        .await?;
    }
    Ok(())
  }

  /// Per-collection lock: held in write mode for the duration of a reset, in
  /// read mode for ordinary queries. Serializes resets behind in-flight
  /// queries (and vice versa) without imposing a timeout on either.
  pub(crate) async fn collection_lock(&self, name: &str) -> Arc<RwLock<()>> {
    let mut locks = self.locks.lock().await;
    locks.entry(name.to_string()).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
  }

  async fn registry_row(&self, name: &str) -> Result<Option<(CollectionKind, usize, String, i64)>> {
    let table = self.connection.open_table(COLLECTIONS_REGISTRY_TABLE).execute().await?;
    let results: Vec<RecordBatch> =
      table.query().only_if(format!("name = '{}'", escape(name))).execute().await?.try_collect().await?;

    for batch in &results {
      if batch.num_rows() == 0 {
        continue;
      }
      let kind_str = batch
        .column_by_name("kind")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .map(|a| a.value(0).to_string())
        .ok_or_else(|| StoreError::CorruptRow("kind".into()))?;
      let dim = batch
        .column_by_name("embedding_dim")
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .map(|a| a.value(0) as usize)
        .ok_or_else(|| StoreError::CorruptRow("embedding_dim".into()))?;
      let model_id = batch
        .column_by_name("embedding_model_id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .map(|a| a.value(0).to_string())
        .ok_or_else(|| StoreError::CorruptRow("embedding_model_id".into()))?;
      let created_at = batch
        .column_by_name("created_at")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .map(|a| a.value(0))
        .ok_or_else(|| StoreError::CorruptRow("created_at".into()))?;
      let kind = CollectionKind::from_str(&kind_str).map_err(|_| StoreError::CorruptRow("kind".into()))?;
      return Ok(Some((kind, dim, model_id, created_at)));
    }
    Ok(None)
  }

  /// Create a collection if it does not already exist. Idempotent on identical
  /// parameters; fails with [`StoreError::DimensionMismatch`] if a collection of
  /// the same name already exists with a different dimension.
  pub async fn create_collection(
    &self,
    name: &str,
    kind: CollectionKind,
    embedding_dim: usize,
    embedding_model_id: &str,
  ) -> Result<()> {
    sleuth_core::validate_collection_name(name).map_err(|e| StoreError::CorruptRow(e.to_string()))?;

    if let Some((_, existing_dim, _, _)) = self.registry_row(name).await? {
      if existing_dim != embedding_dim {
        return Err(StoreError::DimensionMismatch { expected: existing_dim, actual: embedding_dim });
      }
      return Ok(());
    }

    debug!(%name, ?kind, embedding_dim, "creating collection");
    self.connection.create_empty_table(name, schema_for_kind(kind, embedding_dim)).execute().await?;

    let registry_table = self.connection.open_table(COLLECTIONS_REGISTRY_TABLE).execute().await?;
    let created_at = chrono::Utc::now().timestamp_millis();
    let batch = RecordBatch::try_new(
      collections_registry_schema(),
      vec![
        Arc::new(StringArray::from(vec![name.to_string()])),
        Arc::new(StringArray::from(vec![kind.as_str().to_string()])),
        Arc::new(UInt32Array::from(vec![embedding_dim as u32])),
        Arc::new(StringArray::from(vec![embedding_model_id.to_string()])),
        Arc::new(Int64Array::from(vec![created_at])),
      ],
    )?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], collections_registry_schema());
    registry_table.add(Box::new(batches)).execute().await?;
    Ok(())
  }

  /// Remove all persisted state for a collection atomically. Takes the
  /// collection's write lock for the duration so no in-flight query observes a
  /// half-deleted table.
  pub async fn delete_collection(&self, name: &str) -> Result<()> {
    let lock = self.collection_lock(name).await;
    let _guard = lock.write().await;

    if self.connection.table_names().execute().await?.contains(&name.to_string()) {
      self.connection.drop_table(name).await?;
    }
    let registry_table = self.connection.open_table(COLLECTIONS_REGISTRY_TABLE).execute().await?;
    registry_table.delete(&format!("name = '{}'", escape(name))).await?;
    Ok(())
  }

  /// Drop and recreate a collection with the same parameters it previously had
  /// (or the given ones if it did not exist), holding the write lock for the
  /// whole drop+recreate so `reset=true` reindexing is atomic with respect to
  /// concurrent queries.
  pub async fn reset_collection(
    &self,
    name: &str,
    kind: CollectionKind,
    embedding_dim: usize,
    embedding_model_id: &str,
  ) -> Result<()> {
    let lock = self.collection_lock(name).await;
    let _guard = lock.write().await;

    if self.connection.table_names().execute().await?.contains(&name.to_string()) {
      self.connection.drop_table(name).await?;
      let registry_table = self.connection.open_table(COLLECTIONS_REGISTRY_TABLE).execute().await?;
      registry_table.delete(&format!("name = '{}'", escape(name))).await?;
    }

    self.connection.create_empty_table(name, schema_for_kind(kind, embedding_dim)).execute().await?;
    let registry_table = self.connection.open_table(COLLECTIONS_REGISTRY_TABLE).execute().await?;
    let created_at = chrono::Utc::now().timestamp_millis();
    let batch = RecordBatch::try_new(
      collections_registry_schema(),
      vec![
        Arc::new(StringArray::from(vec![name.to_string()])),
        Arc::new(StringArray::from(vec![kind.as_str().to_string()])),
        Arc::new(UInt32Array::from(vec![embedding_dim as u32])),
        Arc::new(StringArray::from(vec![embedding_model_id.to_string()])),
        Arc::new(Int64Array::from(vec![created_at])),
      ],
    )?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], collections_registry_schema());
    registry_table.add(Box::new(batches)).execute().await?;
    Ok(())
  }

  /// List every collection with its current row count.
  pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
    let registry_table = self.connection.open_table(COLLECTIONS_REGISTRY_TABLE).execute().await?;
    let results: Vec<RecordBatch> = registry_table.query().execute().await?.try_collect().await?;

    let mut infos = Vec::new();
    for batch in &results {
      for row in 0..batch.num_rows() {
        let name = batch
          .column_by_name("name")
          .and_then(|c| c.as_any().downcast_ref::<StringArray>())
          .map(|a| a.value(row).to_string())
          .ok_or_else(|| StoreError::CorruptRow("name".into()))?;
        let kind_str = batch
          .column_by_name("kind")
          .and_then(|c| c.as_any().downcast_ref::<StringArray>())
          .map(|a| a.value(row).to_string())
          .ok_or_else(|| StoreError::CorruptRow("kind".into()))?;
        let kind = CollectionKind::from_str(&kind_str).map_err(|_| StoreError::CorruptRow("kind".into()))?;
        let embedding_dim = batch
          .column_by_name("embedding_dim")
          .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
          .map(|a| a.value(row) as usize)
          .ok_or_else(|| StoreError::CorruptRow("embedding_dim".into()))?;
        let embedding_model_id = batch
          .column_by_name("embedding_model_id")
          .and_then(|c| c.as_any().downcast_ref::<StringArray>())
          .map(|a| a.value(row).to_string())
          .ok_or_else(|| StoreError::CorruptRow("embedding_model_id".into()))?;
        let created_at = batch
          .column_by_name("created_at")
          .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
          .map(|a| a.value(row))
          .ok_or_else(|| StoreError::CorruptRow("created_at".into()))?;

        let record_count = self.count(&name).await.unwrap_or(0);
        infos.push(CollectionInfo { name, kind, embedding_dim, embedding_model_id, created_at, record_count });
      }
    }
    Ok(infos)
  }

  /// Number of rows currently stored in a collection.
  pub async fn count(&self, name: &str) -> Result<usize> {
    let lock = self.collection_lock(name).await;
    let _guard = lock.read().await;
    let table = self.open_collection(name).await?;
    Ok(table.count_rows(None).await?)
  }

  pub(crate) async fn open_collection(&self, name: &str) -> Result<lancedb::Table> {
    if !self.connection.table_names().execute().await?.contains(&name.to_string()) {
      return Err(StoreError::CollectionNotFound(name.to_string()));
    }
    Ok(self.connection.open_table(name).execute().await?)
  }

  pub(crate) async fn kind_of(&self, name: &str) -> Result<CollectionKind> {
    self
      .registry_row(name)
      .await?
      .map(|(kind, _, _, _)| kind)
      .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
  }

  /// `(kind, embedding_dim)` for an existing collection, read from the registry
  /// rather than by opening and introspecting the table itself.
  pub(crate) async fn kind_and_dim(&self, name: &str) -> Result<(CollectionKind, usize)> {
    self
      .registry_row(name)
      .await?
      .map(|(kind, dim, _, _)| (kind, dim))
      .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
  }
}

fn escape(value: &str) -> String {
  value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn create_collection_is_idempotent_on_same_dimension() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).await.unwrap();

    store.create_collection("messages_t1", CollectionKind::Messages, 8, "test-model").await.unwrap();
    store.create_collection("messages_t1", CollectionKind::Messages, 8, "test-model").await.unwrap();

    let collections = store.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
  }

  #[tokio::test]
  async fn create_collection_rejects_dimension_change() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).await.unwrap();

    store.create_collection("messages_t1", CollectionKind::Messages, 8, "test-model").await.unwrap();
    let err = store.create_collection("messages_t1", CollectionKind::Messages, 16, "test-model").await.unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { expected: 8, actual: 16 }));
  }

  #[tokio::test]
  async fn delete_collection_removes_registry_entry() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).await.unwrap();

    store.create_collection("messages_t1", CollectionKind::Messages, 8, "test-model").await.unwrap();
    store.delete_collection("messages_t1").await.unwrap();

    assert!(store.list_collections().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn reset_collection_recreates_empty_table() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).await.unwrap();

    store.create_collection("messages_t1", CollectionKind::Messages, 8, "test-model").await.unwrap();
    store.reset_collection("messages_t1", CollectionKind::Messages, 8, "test-model").await.unwrap();

    assert_eq!(store.count("messages_t1").await.unwrap(), 0);
  }
}
