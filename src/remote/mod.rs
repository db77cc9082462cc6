//! Remote module for talking to the issue tracker
//!
//! # Components
//!
//! - `IssueSource`: the four remote operations the harvest needs
//! - `JiraClient`: `IssueSource` over the Jira REST API v2
//! - `retry`: response classification and the backoff policy every request goes through

mod client;
pub mod retry;
mod traits;
mod types;

pub use client::{build_http_client, JiraClient};
pub use retry::{Outcome, RetryDecision, RetryPolicy, RetryState};
pub use traits::{IssueSource, RemoteError, RemoteResult};
pub use types::{CollectionInfo, ItemDetail, ItemSummary, ListPage, SubResource};
