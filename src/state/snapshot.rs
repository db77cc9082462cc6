/// Progress snapshot types
///
/// A snapshot is the full durable view of a harvest: per collection, the pagination
/// cursor and the identifiers already written to output.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Layout version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Key of a remote collection (a Jira project key)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Identifier of a single item (a Jira issue key such as `SPARK-1234`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Pagination offset into a collection's listing
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cursor(u64);

impl Cursor {
    /// Cursor of a collection that has never been listed
    pub const START: Cursor = Cursor(0);

    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub fn offset(self) -> u64 {
        self.0
    }

    /// Returns the cursor positioned after `count` more items
    pub fn advanced_by(self, count: usize) -> Self {
        Self(self.0.saturating_add(count as u64))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable progress of one collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionProgress {
    /// Offset of the first page not yet fully processed
    #[serde(default)]
    pub cursor: Cursor,

    /// Most recently emitted item
    #[serde(default)]
    pub last_item: Option<ItemId>,

    /// Items whose output records are durably written
    #[serde(default)]
    pub processed: BTreeSet<ItemId>,

    /// Items that failed in an earlier run and have not been emitted since
    #[serde(default)]
    pub failed: BTreeSet<ItemId>,
}

/// The full persisted harvest state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub version: u32,

    #[serde(default)]
    pub collections: BTreeMap<CollectionKey, CollectionProgress>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            collections: BTreeMap::new(),
            last_updated: None,
        }
    }
}

impl ProgressSnapshot {
    /// Returns the progress of a collection, if it has ever been referenced
    pub fn collection(&self, key: &CollectionKey) -> Option<&CollectionProgress> {
        self.collections.get(key)
    }

    /// Total number of emitted items across all collections
    pub fn total_processed(&self) -> usize {
        self.collections.values().map(|c| c.processed.len()).sum()
    }

    /// Total number of outstanding failed items across all collections
    pub fn total_failed(&self) -> usize {
        self.collections.values().map(|c| c.failed.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advance() {
        let cursor = Cursor::START.advanced_by(50);
        assert_eq!(cursor.offset(), 50);
        assert!(cursor > Cursor::START);
        assert_eq!(Cursor::new(u64::MAX).advanced_by(1).offset(), u64::MAX);
    }

    #[test]
    fn test_snapshot_json_layout() {
        let mut snapshot = ProgressSnapshot::default();
        let mut progress = CollectionProgress {
            cursor: Cursor::new(150),
            last_item: Some(ItemId::from("SPARK-42")),
            ..Default::default()
        };
        progress.processed.insert(ItemId::from("SPARK-1"));
        snapshot
            .collections
            .insert(CollectionKey::from("SPARK"), progress);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["collections"]["SPARK"]["cursor"], 150);
        assert_eq!(json["collections"]["SPARK"]["last_item"], "SPARK-42");
        assert_eq!(json["collections"]["SPARK"]["processed"][0], "SPARK-1");
        assert!(json["last_updated"].is_null());
    }

    #[test]
    fn test_snapshot_tolerates_missing_sections() {
        let snapshot: ProgressSnapshot =
            serde_json::from_str(r#"{"version": 1, "collections": {"HADOOP": {}}}"#).unwrap();
        let progress = snapshot.collection(&CollectionKey::from("HADOOP")).unwrap();
        assert_eq!(progress.cursor, Cursor::START);
        assert!(progress.processed.is_empty());
        assert_eq!(snapshot.total_processed(), 0);
    }
}
