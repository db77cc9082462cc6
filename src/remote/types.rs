//! Remote payload types
//!
//! Wire structures mirror the Jira REST v2 responses the client reads; everything
//! else about an issue stays as raw JSON for the transform stage.

use crate::state::{CollectionKey, ItemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a collection lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub key: CollectionKey,
    pub name: Option<String>,
}

/// One entry of a list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub id: ItemId,
}

/// One page of a collection listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Items in remote order
    pub items: Vec<ItemSummary>,

    /// Explicit continuation signal, when the remote provides one
    pub has_more: Option<bool>,

    /// Total size of the collection, when the remote reports it
    pub total: Option<u64>,
}

impl ListPage {
    /// Returns true if no page should be requested after this one
    ///
    /// An explicit continuation flag is authoritative; without one, a page shorter than
    /// requested marks the end.
    pub fn is_last(&self, page_size: u32) -> bool {
        if self.items.is_empty() {
            return true;
        }
        match self.has_more {
            Some(more) => !more,
            None => self.items.len() < page_size as usize,
        }
    }
}

/// Full record of one item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail {
    pub id: ItemId,
    pub raw: Value,
}

/// One comment attached to an item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

/// `GET search` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub start_at: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub issues: Vec<IssueRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssueRef {
    pub key: String,
}

/// `GET issue/{key}/comment` response
#[derive(Debug, Deserialize)]
pub(crate) struct CommentPage {
    #[serde(default)]
    pub comments: Option<Vec<SubResource>>,
}

/// `GET project/{key}` response
#[derive(Debug, Deserialize)]
pub(crate) struct ProjectResponse {
    #[serde(default)]
    pub name: Option<String>,
}
