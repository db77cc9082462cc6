//! State module for tracking harvest progress
//!
//! This module owns the durable record of how far each collection has been harvested.
//!
//! # Components
//!
//! - `ProgressSnapshot`: per-collection cursor, processed and failed items
//! - `ProgressStore`: the single owner of the snapshot; skip checks, cursor updates,
//!   atomic persistence and resets
//! - `SnapshotBackend`: durable storage, as a JSON file or a SQLite database

mod json_file;
mod schema;
mod snapshot;
mod sqlite;
mod store;
mod traits;

// Re-export main types
pub use json_file::JsonFileBackend;
pub use snapshot::{
    CollectionKey, CollectionProgress, Cursor, ItemId, ProgressSnapshot, SNAPSHOT_VERSION,
};
pub use sqlite::SqliteBackend;
pub use store::ProgressStore;
pub use traits::{SnapshotBackend, StateError, StateResult};
