//! Snapshot backend trait and error types
//!
//! A backend only knows how to read and atomically replace a whole
//! [`ProgressSnapshot`]; all progress semantics live in [`ProgressStore`].
//!
//! [`ProgressStore`]: crate::state::ProgressStore

use crate::state::snapshot::{CollectionKey, Cursor, ProgressSnapshot};
use thiserror::Error;

/// Errors that can occur during state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State at {location} is unreadable: {message}")]
    Corrupt { location: String, message: String },

    #[error("Cursor regression for {collection}: {current} -> {proposed}")]
    InvalidCursor {
        collection: CollectionKey,
        current: Cursor,
        proposed: Cursor,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;

/// Durable storage for a progress snapshot
pub trait SnapshotBackend: Send {
    /// Reads the stored snapshot
    ///
    /// Returns `Ok(None)` when nothing has been stored yet. Unreadable or undecodable
    /// state is reported as [`StateError::Corrupt`].
    fn read(&self) -> StateResult<Option<ProgressSnapshot>>;

    /// Replaces the stored snapshot
    ///
    /// Implementations must never leave a partially written snapshot observable.
    fn write(&mut self, snapshot: &ProgressSnapshot) -> StateResult<()>;

    /// Human-readable location, used in logs and errors
    fn describe(&self) -> String;
}
