//! Namespaced record store with optional JSON file persistence.

use crate::error::StoreError;
use crate::types::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Shared handle to the record database.
///
/// Every mutation rewrites the backing file (when one is configured) while
/// the write lock is held, so the file always reflects a complete state.
#[derive(Clone)]
pub struct Store {
    db: Arc<RwLock<Database>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Create a store that lives only in memory.
    pub fn memory() -> Self {
        Self {
            db: Arc::new(RwLock::new(Database::default())),
            path: None,
        }
    }

    /// Open a file-backed store, loading existing contents if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let db = if fs::try_exists(&path).await? {
            let data = fs::read(&path).await?;
            if data.is_empty() {
                Database::default()
            } else {
                serde_json::from_slice(&data)?
            }
        } else {
            Database::default()
        };

        info!(
            "Opened record store at {:?} ({} records)",
            path,
            db.record_count()
        );

        let store = Self {
            db: Arc::new(RwLock::new(db)),
            path: Some(path),
        };
        // Fail early on unwritable locations rather than on the first save.
        store.flush(&*store.db.read().await).await?;
        Ok(store)
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the namespace handle for `name`.
    pub fn bucket(&self, name: impl Into<String>) -> Bucket {
        Bucket {
            store: self.clone(),
            name: name.into(),
        }
    }

    /// Total number of records across all namespaces.
    pub async fn record_count(&self) -> usize {
        self.db.read().await.record_count()
    }

    async fn flush(&self, db: &Database) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = serde_json::to_vec_pretty(db)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Flushed record store ({} bytes) to {:?}", data.len(), path);
        Ok(())
    }
}

/// A module's isolated view of the store.
#[derive(Clone)]
pub struct Bucket {
    store: Store,
    name: String,
}

impl Bucket {
    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or update a record. A record with id `0` gets the next id.
    ///
    /// If the backing file cannot be written the change is undone and the
    /// record keeps its original id.
    #[instrument(skip(self, record), fields(bucket = %self.name, kind = T::KIND))]
    pub async fn save<T: Record>(&self, record: &mut T) -> Result<(), StoreError> {
        let mut db = self.store.db.write().await;
        let collection = db.collection_mut(&self.name, T::KIND);
        let last_id = collection.last_id;

        let assigned = record.id() == 0;
        if assigned {
            let next = last_id
                .checked_add(1)
                .ok_or(StoreError::IdsExhausted { kind: T::KIND })?;
            record.set_id(next);
        }
        let id = record.id();
        let value = match serde_json::to_value(&*record) {
            Ok(value) => value,
            Err(e) => {
                if assigned {
                    record.set_id(0);
                }
                return Err(e.into());
            }
        };
        collection.last_id = last_id.max(id);
        let previous = collection.records.insert(id, value);

        if let Err(e) = self.store.flush(&db).await {
            let collection = db.collection_mut(&self.name, T::KIND);
            collection.last_id = last_id;
            match previous {
                Some(previous) => collection.records.insert(id, previous),
                None => collection.records.remove(&id),
            };
            if assigned {
                record.set_id(0);
            }
            warn!(id, error = %e, "Save not persisted, rolled back");
            return Err(e);
        }

        debug!(id, "Saved record");
        Ok(())
    }

    /// Fetch a record by id.
    pub async fn one<T: Record>(&self, id: u64) -> Result<T, StoreError> {
        let db = self.store.db.read().await;
        let value = db
            .collection(&self.name, T::KIND)
            .and_then(|c| c.records.get(&id))
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                key: id.to_string(),
            })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Fetch the first record (in id order) whose `field` equals `value`.
    pub async fn find_one<T: Record>(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<T, StoreError> {
        let db = self.store.db.read().await;
        let found = db
            .collection(&self.name, T::KIND)
            .and_then(|c| c.records.values().find(|r| r.get(field) == Some(value)))
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                key: format!("{}={}", field, value),
            })?;
        Ok(serde_json::from_value(found.clone())?)
    }

    /// Fetch every record of a kind, in id order.
    pub async fn all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let db = self.store.db.read().await;
        db.collection(&self.name, T::KIND)
            .map(|c| c.records.values())
            .into_iter()
            .flatten()
            .map(|v| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    /// Delete a record by id.
    #[instrument(skip(self), fields(bucket = %self.name, kind = T::KIND))]
    pub async fn delete<T: Record>(&self, id: u64) -> Result<(), StoreError> {
        let mut db = self.store.db.write().await;
        let Some(removed) = db.collection_mut(&self.name, T::KIND).records.remove(&id) else {
            return Err(StoreError::NotFound {
                kind: T::KIND,
                key: id.to_string(),
            });
        };

        if let Err(e) = self.store.flush(&db).await {
            db.collection_mut(&self.name, T::KIND)
                .records
                .insert(id, removed);
            warn!(id, error = %e, "Delete not persisted, rolled back");
            return Err(e);
        }

        debug!(id, "Deleted record");
        Ok(())
    }
}
