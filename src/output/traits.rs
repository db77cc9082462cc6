//! Output sink trait and error types

use crate::state::{CollectionKey, ItemId};
use crate::transform::OutputRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record {issue_key}: {source}")]
    Serialization {
        issue_key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Durable destination for output records
///
/// The harvest only marks an item processed after `append_batch` has returned, so a
/// sink must not return before the batch survives a crash.
pub trait OutputSink {
    /// Appends records in order and makes them durable before returning
    fn append_batch(&mut self, records: &[OutputRecord]) -> OutputResult<()>;

    /// Returns true if a record for this item is already durably held
    fn contains(&self, collection: &CollectionKey, id: &ItemId) -> bool;
}
