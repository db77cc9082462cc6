//! Statistics generation from the progress snapshot
//!
//! This module provides functionality for extracting and displaying harvest
//! statistics from persisted state.

use crate::state::ProgressSnapshot;

/// Per-collection progress figures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatistics {
    pub collection: String,
    pub cursor: u64,
    pub processed: usize,
    pub failed: usize,
    pub last_item: Option<String>,
}

/// Harvest statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Where the snapshot was read from
    pub location: String,

    /// Time of the last persist, RFC 3339
    pub last_updated: Option<String>,

    /// Collections in key order
    pub collections: Vec<CollectionStatistics>,

    /// Total number of processed items across collections
    pub total_processed: usize,

    /// Total number of outstanding failed items across collections
    pub total_failed: usize,
}

/// Builds statistics from a snapshot
pub fn load_statistics(snapshot: &ProgressSnapshot, location: impl Into<String>) -> HarvestStatistics {
    let collections = snapshot
        .collections
        .iter()
        .map(|(key, progress)| CollectionStatistics {
            collection: key.to_string(),
            cursor: progress.cursor.offset(),
            processed: progress.processed.len(),
            failed: progress.failed.len(),
            last_item: progress.last_item.as_ref().map(|id| id.to_string()),
        })
        .collect();

    HarvestStatistics {
        location: location.into(),
        last_updated: snapshot.last_updated.map(|t| t.to_rfc3339()),
        collections,
        total_processed: snapshot.total_processed(),
        total_failed: snapshot.total_failed(),
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  State: {}", stats.location);
    println!(
        "  Last updated: {}",
        stats.last_updated.as_deref().unwrap_or("never")
    );
    println!("  Collections tracked: {}", stats.collections.len());
    println!("  Items processed: {}", stats.total_processed);
    println!("  Items failed: {}", stats.total_failed);
    println!();

    if stats.collections.is_empty() {
        return;
    }

    println!("Collections:");
    for collection in &stats.collections {
        let share = if stats.total_processed > 0 {
            (collection.processed as f64 / stats.total_processed as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "  {}: {} processed ({:.1}%), {} failed, cursor {}",
            collection.collection, collection.processed, share, collection.failed, collection.cursor
        );
        if let Some(last) = &collection.last_item {
            println!("    last item: {}", last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CollectionKey, CollectionProgress, Cursor, ItemId};

    #[test]
    fn test_statistics_from_snapshot() {
        let mut snapshot = ProgressSnapshot::default();
        let mut spark = CollectionProgress {
            cursor: Cursor::new(100),
            last_item: Some(ItemId::from("SPARK-2")),
            ..Default::default()
        };
        spark.processed.insert(ItemId::from("SPARK-1"));
        spark.processed.insert(ItemId::from("SPARK-2"));
        spark.failed.insert(ItemId::from("SPARK-3"));
        snapshot.collections.insert(CollectionKey::from("SPARK"), spark);
        snapshot
            .collections
            .insert(CollectionKey::from("FLINK"), CollectionProgress::default());

        let stats = load_statistics(&snapshot, "state.json");

        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.last_updated, None);
        assert_eq!(stats.collections.len(), 2);
        // key order
        assert_eq!(stats.collections[0].collection, "FLINK");
        assert_eq!(stats.collections[1].cursor, 100);
        assert_eq!(stats.collections[1].last_item.as_deref(), Some("SPARK-2"));
    }
}
