//! The progress store
//!
//! [`ProgressStore`] is the single owner of the harvest's progress snapshot. All
//! mutation goes through its narrow interface; nothing reaches the backend until
//! [`ProgressStore::persist`] is called.

use crate::config::{StateBackendKind, StateConfig};
use crate::state::json_file::JsonFileBackend;
use crate::state::snapshot::{
    CollectionKey, CollectionProgress, Cursor, ItemId, ProgressSnapshot, SNAPSHOT_VERSION,
};
use crate::state::sqlite::SqliteBackend;
use crate::state::traits::{SnapshotBackend, StateError, StateResult};
use chrono::Utc;
use std::path::Path;

/// Single-owner progress state backed by a durable snapshot
pub struct ProgressStore {
    backend: Box<dyn SnapshotBackend>,
    snapshot: ProgressSnapshot,
}

impl ProgressStore {
    /// Opens a store and loads whatever the backend holds
    ///
    /// # Errors
    ///
    /// [`StateError::Corrupt`] if stored state exists but cannot be read.
    pub fn open(backend: Box<dyn SnapshotBackend>) -> StateResult<Self> {
        let mut store = Self {
            backend,
            snapshot: ProgressSnapshot::default(),
        };
        store.load()?;
        Ok(store)
    }

    /// Opens the backend selected by the `[state]` configuration section
    pub fn from_config(config: &StateConfig) -> StateResult<Self> {
        let backend: Box<dyn SnapshotBackend> = match config.backend {
            StateBackendKind::Json => Box::new(JsonFileBackend::new(&config.path)),
            StateBackendKind::Sqlite => Box::new(SqliteBackend::new(Path::new(&config.path))?),
        };
        Self::open(backend)
    }

    /// Re-reads the durable snapshot, discarding unpersisted changes
    ///
    /// Returns an empty snapshot when nothing has been stored yet.
    pub fn load(&mut self) -> StateResult<&ProgressSnapshot> {
        let snapshot = self.backend.read()?.unwrap_or_default();

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StateError::Corrupt {
                location: self.backend.describe(),
                message: format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            });
        }

        tracing::info!(
            "Loaded state from {}: {} collections tracked, {} items processed",
            self.backend.describe(),
            snapshot.collections.len(),
            snapshot.total_processed()
        );

        self.snapshot = snapshot;
        Ok(&self.snapshot)
    }

    /// The current in-memory snapshot
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Where the snapshot is persisted
    pub fn location(&self) -> String {
        self.backend.describe()
    }

    /// Checks whether an item's output record is already durable
    ///
    /// # Arguments
    ///
    /// * `collection` - Collection the item belongs to
    /// * `id` - Item identifier as listed by the remote
    ///
    /// # Returns
    ///
    /// `false` for collections the store has never seen.
    pub fn is_processed(&self, collection: &CollectionKey, id: &ItemId) -> bool {
        self.snapshot
            .collection(collection)
            .map(|c| c.processed.contains(id))
            .unwrap_or(false)
    }

    /// Records an item as durably emitted
    ///
    /// Idempotent. Must only be called once the item's output record is durable.
    pub fn mark_processed(&mut self, collection: &CollectionKey, id: ItemId) {
        let progress = self.entry(collection);
        progress.failed.remove(&id);
        progress.last_item = Some(id.clone());
        progress.processed.insert(id);
    }

    /// Records an item that could not be processed in this run
    ///
    /// Failed items are replayed at the start of the next run. Only failures that may
    /// clear up on their own belong here; a no-op if the item is already processed.
    ///
    /// # Arguments
    ///
    /// * `collection` - Collection the item was listed under
    /// * `id` - The item that failed
    pub fn mark_failed(&mut self, collection: &CollectionKey, id: ItemId) {
        let progress = self.entry(collection);
        if !progress.processed.contains(&id) {
            progress.failed.insert(id);
        }
    }

    /// Drops an item from the failed backlog without marking it processed
    ///
    /// # Returns
    ///
    /// `true` if the item was in the backlog.
    pub fn clear_failed(&mut self, collection: &CollectionKey, id: &ItemId) -> bool {
        self.snapshot
            .collections
            .get_mut(collection)
            .map(|c| c.failed.remove(id))
            .unwrap_or(false)
    }

    /// Outstanding failed items of a collection, in identifier order
    pub fn failed_items(&self, collection: &CollectionKey) -> Vec<ItemId> {
        self.snapshot
            .collection(collection)
            .map(|c| c.failed.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn processed_count(&self, collection: &CollectionKey) -> usize {
        self.snapshot
            .collection(collection)
            .map(|c| c.processed.len())
            .unwrap_or(0)
    }

    /// Current cursor of a collection; [`Cursor::START`] if never referenced
    pub fn cursor(&self, collection: &CollectionKey) -> Cursor {
        self.snapshot
            .collection(collection)
            .map(|c| c.cursor)
            .unwrap_or(Cursor::START)
    }

    /// Moves a collection's cursor forward
    ///
    /// # Errors
    ///
    /// [`StateError::InvalidCursor`] if `cursor` is behind the current value.
    pub fn advance_cursor(&mut self, collection: &CollectionKey, cursor: Cursor) -> StateResult<()> {
        let current = self.cursor(collection);
        if cursor < current {
            return Err(StateError::InvalidCursor {
                collection: collection.clone(),
                current,
                proposed: cursor,
            });
        }
        self.entry(collection).cursor = cursor;
        Ok(())
    }

    /// Atomically writes the full snapshot to the backend
    pub fn persist(&mut self) -> StateResult<()> {
        self.snapshot.last_updated = Some(Utc::now());
        self.backend.write(&self.snapshot)?;
        tracing::debug!("State saved to {}", self.backend.describe());
        Ok(())
    }

    /// Clears cursor, processed and failed items of one collection
    ///
    /// Returns false if the collection had no state. The caller persists.
    pub fn reset_collection(&mut self, collection: &CollectionKey) -> bool {
        let existed = self.snapshot.collections.remove(collection).is_some();
        tracing::info!("Reset state for collection {}", collection);
        existed
    }

    /// Clears all collections. The caller persists.
    pub fn reset_all(&mut self) {
        self.snapshot.collections.clear();
        tracing::info!("Reset state for all collections");
    }

    fn entry(&mut self, collection: &CollectionKey) -> &mut CollectionProgress {
        self.snapshot
            .collections
            .entry(collection.clone())
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Backend that keeps the last written snapshot in shared memory
    #[derive(Clone, Default)]
    struct MemoryBackend {
        stored: Arc<Mutex<Option<ProgressSnapshot>>>,
        writes: Arc<Mutex<u32>>,
    }

    impl SnapshotBackend for MemoryBackend {
        fn read(&self) -> StateResult<Option<ProgressSnapshot>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        fn write(&mut self, snapshot: &ProgressSnapshot) -> StateResult<()> {
            *self.stored.lock().unwrap() = Some(snapshot.clone());
            *self.writes.lock().unwrap() += 1;
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    fn spark() -> CollectionKey {
        CollectionKey::from("SPARK")
    }

    #[test]
    fn test_open_empty() {
        let store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        assert!(store.snapshot().collections.is_empty());
        assert_eq!(store.cursor(&spark()), Cursor::START);
        assert!(!store.is_processed(&spark(), &ItemId::from("SPARK-1")));
    }

    #[test]
    fn test_mark_processed_is_idempotent() {
        let mut store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.mark_processed(&spark(), ItemId::from("SPARK-1"));
        store.mark_processed(&spark(), ItemId::from("SPARK-1"));

        assert!(store.is_processed(&spark(), &ItemId::from("SPARK-1")));
        assert_eq!(store.processed_count(&spark()), 1);
    }

    #[test]
    fn test_mark_processed_clears_failure() {
        let mut store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.mark_failed(&spark(), ItemId::from("SPARK-3"));
        assert_eq!(store.failed_items(&spark()), vec![ItemId::from("SPARK-3")]);

        store.mark_processed(&spark(), ItemId::from("SPARK-3"));
        assert!(store.failed_items(&spark()).is_empty());

        // an emitted item never goes back to failed
        store.mark_failed(&spark(), ItemId::from("SPARK-3"));
        assert!(store.failed_items(&spark()).is_empty());
    }

    #[test]
    fn test_clear_failed_leaves_item_unprocessed() {
        let mut store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.mark_failed(&spark(), ItemId::from("SPARK-3"));

        assert!(store.clear_failed(&spark(), &ItemId::from("SPARK-3")));
        assert!(!store.clear_failed(&spark(), &ItemId::from("SPARK-3")));
        assert!(!store.clear_failed(&CollectionKey::from("HIVE"), &ItemId::from("HIVE-1")));
        assert!(store.failed_items(&spark()).is_empty());
        assert!(!store.is_processed(&spark(), &ItemId::from("SPARK-3")));
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let mut store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.advance_cursor(&spark(), Cursor::new(50)).unwrap();
        store.advance_cursor(&spark(), Cursor::new(50)).unwrap();

        let err = store.advance_cursor(&spark(), Cursor::new(10)).unwrap_err();
        assert!(matches!(
            err,
            StateError::InvalidCursor { current, proposed, .. }
                if current == Cursor::new(50) && proposed == Cursor::new(10)
        ));
        assert_eq!(store.cursor(&spark()), Cursor::new(50));
    }

    #[test]
    fn test_nothing_durable_until_persist() {
        let backend = MemoryBackend::default();
        let mut store = ProgressStore::open(Box::new(backend.clone())).unwrap();

        store.mark_processed(&spark(), ItemId::from("SPARK-1"));
        store.advance_cursor(&spark(), Cursor::new(1)).unwrap();
        assert!(backend.stored.lock().unwrap().is_none());

        store.persist().unwrap();
        let stored = backend.stored.lock().unwrap().clone().unwrap();
        assert!(stored.last_updated.is_some());
        assert_eq!(stored.collection(&spark()).unwrap().cursor, Cursor::new(1));
    }

    #[test]
    fn test_load_discards_unpersisted_changes() {
        let mut store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.mark_processed(&spark(), ItemId::from("SPARK-1"));
        store.persist().unwrap();

        store.mark_processed(&spark(), ItemId::from("SPARK-2"));
        store.load().unwrap();

        assert!(store.is_processed(&spark(), &ItemId::from("SPARK-1")));
        assert!(!store.is_processed(&spark(), &ItemId::from("SPARK-2")));
    }

    #[test]
    fn test_reset_collection_only_touches_one() {
        let mut store = ProgressStore::open(Box::new(MemoryBackend::default())).unwrap();
        let hadoop = CollectionKey::from("HADOOP");
        store.mark_processed(&spark(), ItemId::from("SPARK-1"));
        store.mark_processed(&hadoop, ItemId::from("HADOOP-1"));
        store.advance_cursor(&spark(), Cursor::new(5)).unwrap();

        assert!(store.reset_collection(&spark()));
        assert!(!store.reset_collection(&spark()));

        assert_eq!(store.cursor(&spark()), Cursor::START);
        assert!(!store.is_processed(&spark(), &ItemId::from("SPARK-1")));
        assert!(store.is_processed(&hadoop, &ItemId::from("HADOOP-1")));

        // after a reset the cursor may start over
        store.advance_cursor(&spark(), Cursor::new(1)).unwrap();

        store.reset_all();
        assert!(store.snapshot().collections.is_empty());
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let backend = MemoryBackend::default();
        *backend.stored.lock().unwrap() = Some(ProgressSnapshot {
            version: 99,
            ..Default::default()
        });

        assert!(matches!(
            ProgressStore::open(Box::new(backend)),
            Err(StateError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_from_config_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = StateConfig {
            path: dir.path().join("state.json").display().to_string(),
            backend: StateBackendKind::Json,
        };

        {
            let mut store = ProgressStore::from_config(&config).unwrap();
            store.mark_processed(&spark(), ItemId::from("SPARK-9"));
            store.advance_cursor(&spark(), Cursor::new(10)).unwrap();
            store.persist().unwrap();
        }

        let store = ProgressStore::from_config(&config).unwrap();
        assert!(store.is_processed(&spark(), &ItemId::from("SPARK-9")));
        assert_eq!(store.cursor(&spark()), Cursor::new(10));
    }

    #[test]
    fn test_from_config_sqlite_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = StateConfig {
            path: dir.path().join("state.db").display().to_string(),
            backend: StateBackendKind::Sqlite,
        };

        {
            let mut store = ProgressStore::from_config(&config).unwrap();
            store.mark_processed(&spark(), ItemId::from("SPARK-9"));
            store.mark_failed(&spark(), ItemId::from("SPARK-4"));
            store.persist().unwrap();
        }

        let store = ProgressStore::from_config(&config).unwrap();
        assert!(store.is_processed(&spark(), &ItemId::from("SPARK-9")));
        assert_eq!(store.failed_items(&spark()), vec![ItemId::from("SPARK-4")]);
    }
}
