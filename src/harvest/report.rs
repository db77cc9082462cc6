//! Run and per-collection outcome reporting

use crate::state::CollectionKey;
use std::fmt;

/// Terminal state of one collection in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// Pagination reached the end
    Done,
    /// Stopped by escalation or a non-retryable listing failure; resumable
    Aborted { reason: String },
    /// Stopped by operator cancellation; resumable
    Interrupted,
}

impl fmt::Display for CollectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Aborted { reason } => write!(f, "aborted ({})", reason),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// What happened to one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub collection: CollectionKey,
    pub outcome: CollectionOutcome,
    /// Records written to output in this run
    pub emitted: usize,
    /// Items skipped because they were already emitted
    pub skipped: usize,
    /// Items that failed in this run
    pub failed: usize,
}

impl CollectionReport {
    pub(crate) fn new(collection: CollectionKey) -> Self {
        Self {
            collection,
            outcome: CollectionOutcome::Done,
            emitted: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

/// Outcome of a whole run, in collection order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub collections: Vec<CollectionReport>,
}

impl RunReport {
    pub fn total_emitted(&self) -> usize {
        self.collections.iter().map(|c| c.emitted).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.collections.iter().map(|c| c.failed).sum()
    }

    pub fn any_aborted(&self) -> bool {
        self.collections
            .iter()
            .any(|c| matches!(c.outcome, CollectionOutcome::Aborted { .. }))
    }

    pub fn was_interrupted(&self) -> bool {
        self.collections
            .iter()
            .any(|c| c.outcome == CollectionOutcome::Interrupted)
    }

    /// True when every collection finished
    pub fn is_success(&self) -> bool {
        !self.any_aborted() && !self.was_interrupted()
    }

    pub fn get(&self, collection: &CollectionKey) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| &c.collection == collection)
    }
}
