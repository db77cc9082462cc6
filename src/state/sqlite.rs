//! SQLite snapshot backend
//!
//! The whole snapshot is replaced inside a single transaction, so readers only ever
//! see the previous commit or the new one.

use crate::state::schema::initialize_schema;
use crate::state::snapshot::{
    CollectionKey, CollectionProgress, Cursor, ItemId, ProgressSnapshot,
};
use crate::state::traits::{SnapshotBackend, StateError, StateResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Snapshot stored in a SQLite database
pub struct SqliteBackend {
    conn: Connection,
    location: String,
}

impl SqliteBackend {
    /// Opens (or creates) the progress database at `path`
    pub fn new(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let location = path.display().to_string();
        let conn = Connection::open(path)?;
        Self::prepare(conn, location)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StateResult<Self> {
        Self::prepare(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn prepare(conn: Connection, location: String) -> StateResult<Self> {
        // a non-database file only surfaces once the first statement runs
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
        ",
        )
        .and_then(|_| initialize_schema(&conn))
        .map_err(|e| StateError::Corrupt {
            location: location.clone(),
            message: e.to_string(),
        })?;

        Ok(Self { conn, location })
    }

    fn corrupt(&self, message: impl ToString) -> StateError {
        StateError::Corrupt {
            location: self.location.clone(),
            message: message.to_string(),
        }
    }

    fn read_meta(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM snapshot_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    fn read_snapshot(&self) -> StateResult<Option<ProgressSnapshot>> {
        let version = match self.read_meta("version")? {
            Some(v) => v
                .parse::<u32>()
                .map_err(|e| self.corrupt(format!("bad version '{}': {}", v, e)))?,
            None => return Ok(None),
        };

        let last_updated = match self.read_meta("last_updated")? {
            Some(ts) => Some(
                ts.parse::<DateTime<Utc>>()
                    .map_err(|e| self.corrupt(format!("bad timestamp '{}': {}", ts, e)))?,
            ),
            None => None,
        };

        let mut snapshot = ProgressSnapshot {
            version,
            last_updated,
            ..Default::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT key, cursor, last_item FROM collections")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        for row in rows {
            let (key, cursor, last_item) = row?;
            let cursor = u64::try_from(cursor)
                .map_err(|_| self.corrupt(format!("negative cursor for {}", key)))?;
            snapshot.collections.insert(
                CollectionKey::new(key),
                CollectionProgress {
                    cursor: Cursor::new(cursor),
                    last_item: last_item.map(ItemId::new),
                    ..Default::default()
                },
            );
        }

        for (table, failed) in [("processed_items", false), ("failed_items", true)] {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT collection, item_id FROM {}", table))?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (collection, item_id) = row?;
                let progress = snapshot
                    .collections
                    .entry(CollectionKey::new(collection))
                    .or_default();
                if failed {
                    progress.failed.insert(ItemId::new(item_id));
                } else {
                    progress.processed.insert(ItemId::new(item_id));
                }
            }
        }

        Ok(Some(snapshot))
    }
}

impl SnapshotBackend for SqliteBackend {
    fn read(&self) -> StateResult<Option<ProgressSnapshot>> {
        self.read_snapshot().map_err(|e| match e {
            StateError::Sqlite(inner) => self.corrupt(inner),
            other => other,
        })
    }

    fn write(&mut self, snapshot: &ProgressSnapshot) -> StateResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            "
            DELETE FROM processed_items;
            DELETE FROM failed_items;
            DELETE FROM collections;
            DELETE FROM snapshot_meta;
        ",
        )?;

        {
            let mut insert_collection = tx.prepare(
                "INSERT INTO collections (key, cursor, last_item) VALUES (?1, ?2, ?3)",
            )?;
            let mut insert_processed = tx
                .prepare("INSERT INTO processed_items (collection, item_id) VALUES (?1, ?2)")?;
            let mut insert_failed =
                tx.prepare("INSERT INTO failed_items (collection, item_id) VALUES (?1, ?2)")?;

            for (key, progress) in &snapshot.collections {
                let cursor = i64::try_from(progress.cursor.offset()).unwrap_or(i64::MAX);
                insert_collection.execute(params![
                    key.as_str(),
                    cursor,
                    progress.last_item.as_ref().map(|id| id.as_str()),
                ])?;

                for id in &progress.processed {
                    insert_processed.execute(params![key.as_str(), id.as_str()])?;
                }
                for id in &progress.failed {
                    insert_failed.execute(params![key.as_str(), id.as_str()])?;
                }
            }

            let mut insert_meta =
                tx.prepare("INSERT INTO snapshot_meta (key, value) VALUES (?1, ?2)")?;
            insert_meta.execute(params!["version", snapshot.version.to_string()])?;
            if let Some(ts) = snapshot.last_updated {
                insert_meta.execute(params!["last_updated", ts.to_rfc3339()])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}
