//! Remote source trait and error types

use crate::remote::types::{CollectionInfo, ItemDetail, ListPage, SubResource};
use crate::state::{CollectionKey, Cursor, ItemId};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the remote API
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Retryable failures persisted past the attempt ceiling
    #[error("Remote unavailable for {url} after {attempts} attempts: {last_error}")]
    Unavailable {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The remote refused the request; retrying will not help
    #[error("Remote rejected {url}{}: {message}", status_suffix(.status))]
    Rejected {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// A successful response whose body is not the expected shape
    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {}", s)).unwrap_or_default()
}

impl RemoteError {
    /// Returns true if the error means the remote is currently unreachable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A paginated remote collection of issues
///
/// Every operation applies the retry policy internally; callers only see the final
/// classification.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Looks up a collection before it is listed
    async fn describe_collection(&self, collection: &CollectionKey) -> RemoteResult<CollectionInfo>;

    /// Lists one page of item summaries starting at `cursor`
    async fn list_page(
        &self,
        collection: &CollectionKey,
        cursor: Cursor,
        page_size: u32,
    ) -> RemoteResult<ListPage>;

    /// Fetches the full record of one item
    async fn fetch_detail(&self, item: &ItemId) -> RemoteResult<ItemDetail>;

    /// Fetches the sub-resources (comments) of one item
    ///
    /// An item without sub-resources yields an empty vector, not an error.
    async fn fetch_sub_resources(&self, item: &ItemId) -> RemoteResult<Vec<SubResource>>;
}
